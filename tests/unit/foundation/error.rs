use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        RenderError::context("x")
            .to_string()
            .contains("context error:")
    );
    assert!(
        RenderError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        RenderError::evaluation("x")
            .to_string()
            .contains("evaluation error:")
    );
    assert!(RenderError::gpu("x").to_string().contains("gpu error:"));
    assert_eq!(
        RenderError::NotInitialized.to_string(),
        "render worker is not initialized"
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = RenderError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
