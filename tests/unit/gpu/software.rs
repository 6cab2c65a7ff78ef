use super::*;
use crate::foundation::core::Rgba8Premul;
use crate::gpu::Uniforms;

fn current_functions(master: &SoftwareMaster) -> (Box<dyn GpuContext>, Rc<dyn GpuFunctions>) {
    let mut ctx = master.create_shared().unwrap();
    let surface = OffscreenSurface::create();
    ctx.make_current(&surface).unwrap();
    let gl = ctx.functions().unwrap();
    (ctx, gl)
}

#[test]
fn functions_are_unavailable_until_current() {
    let master = SoftwareMaster::new();
    let ctx = master.create_shared().unwrap();
    assert!(ctx.functions().is_none());
}

#[test]
fn injected_failures_are_reported() {
    let master = SoftwareMaster::new();
    master.fail_context_creation(true);
    assert!(master.create_shared().is_err());
    master.fail_context_creation(false);

    let mut ctx = master.create_shared().unwrap();
    master.fail_make_current(true);
    assert!(ctx.make_current(&OffscreenSurface::create()).is_err());
    assert!(ctx.functions().is_none());
}

#[test]
fn context_cannot_be_current_on_two_threads() {
    let master = SoftwareMaster::new();
    let mut ctx = master.create_shared().unwrap();
    ctx.make_current(&OffscreenSurface::create()).unwrap();

    let res = std::thread::spawn(move || {
        let surface = OffscreenSurface::create();
        ctx.make_current(&surface).is_err()
    })
    .join()
    .unwrap();
    assert!(res);
}

#[test]
fn fill_then_over_composites_premultiplied() {
    let master = SoftwareMaster::new();
    let (_ctx, gl) = current_functions(&master);
    let fb = gl.create_framebuffer().unwrap();
    let fill = gl.create_program(ProgramKind::Fill).unwrap();
    let over_prog = gl.create_program(ProgramKind::Over).unwrap();

    let red = gl
        .draw(&DrawCall {
            program: fill,
            framebuffer: fb,
            inputs: &[],
            uniforms: Uniforms {
                color: Rgba8Premul::from_straight_rgba(255, 0, 0, 255),
                opacity: 1.0,
            },
            width: 4,
            height: 2,
        })
        .unwrap();
    let half_blue = gl
        .draw(&DrawCall {
            program: fill,
            framebuffer: fb,
            inputs: &[],
            uniforms: Uniforms {
                color: Rgba8Premul::from_straight_rgba(0, 0, 255, 255),
                opacity: 0.5,
            },
            width: 4,
            height: 2,
        })
        .unwrap();

    let out = gl
        .draw(&DrawCall {
            program: over_prog,
            framebuffer: fb,
            inputs: &[red, half_blue],
            uniforms: Uniforms::default(),
            width: 4,
            height: 2,
        })
        .unwrap();
    let frame = gl.read_pixels(&out).unwrap();
    assert_eq!((frame.width, frame.height), (4, 2));
    let px = frame.pixel(3, 1).unwrap();
    assert_eq!(px.a, 255);
    assert!(px.r > 120 && px.r < 135);
    assert!(px.b > 120 && px.b < 135);
}

#[test]
fn blit_resamples_to_target_size() {
    let master = SoftwareMaster::new();
    let (_ctx, gl) = current_functions(&master);
    let fb = gl.create_framebuffer().unwrap();
    let blit = gl.create_program(ProgramKind::Blit).unwrap();

    let src = FrameRGBA {
        width: 1,
        height: 1,
        data: vec![9, 8, 7, 255],
    };
    let tex = gl.upload_texture(&src).unwrap();
    let out = gl
        .draw(&DrawCall {
            program: blit,
            framebuffer: fb,
            inputs: &[tex],
            uniforms: Uniforms::default(),
            width: 3,
            height: 3,
        })
        .unwrap();
    let frame = gl.read_pixels(&out).unwrap();
    assert_eq!(frame.pixel(2, 2).unwrap().to_array(), [9, 8, 7, 255]);
}

#[test]
fn framebuffers_do_not_cross_contexts() {
    let master = SoftwareMaster::new();
    let (_a, gl_a) = current_functions(&master);
    let (_b, gl_b) = current_functions(&master);
    let fb_b = gl_b.create_framebuffer().unwrap();
    let prog_a = gl_a.create_program(ProgramKind::Fill).unwrap();

    let res = gl_a.draw(&DrawCall {
        program: prog_a,
        framebuffer: fb_b,
        inputs: &[],
        uniforms: Uniforms::default(),
        width: 1,
        height: 1,
    });
    assert!(res.is_err());
}

#[test]
fn textures_are_shared_between_contexts() {
    let master = SoftwareMaster::new();
    let (_a, gl_a) = current_functions(&master);
    let (_b, gl_b) = current_functions(&master);
    let tex = gl_a
        .upload_texture(&FrameRGBA {
            width: 1,
            height: 1,
            data: vec![1, 2, 3, 4],
        })
        .unwrap();
    let back = gl_b.read_pixels(&tex).unwrap();
    assert_eq!(back.data, vec![1, 2, 3, 4]);
}

#[test]
fn calls_are_recorded_per_context() {
    let master = SoftwareMaster::new();
    let (_a, gl_a) = current_functions(&master);
    gl_a.enable_blend();
    gl_a.viewport(0, 0, 8, 6);
    gl_a.flush();
    gl_a.finish();

    let calls = master.calls_for(1);
    assert_eq!(
        calls,
        vec![
            GpuCall::EnableBlend,
            GpuCall::Viewport {
                x: 0,
                y: 0,
                width: 8,
                height: 6
            },
            GpuCall::Flush,
            GpuCall::Finish,
        ]
    );
    master.clear_calls();
    assert!(master.calls().is_empty());
}
