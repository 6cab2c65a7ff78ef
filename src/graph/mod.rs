pub mod keyframe;
pub mod kinds;
pub mod node;
pub mod node_graph;
pub mod path;
pub mod value;

pub use keyframe::{Interp, Keyframe, Keyframes};
pub use node::{InputDesc, InputRef, InputRole, InputValues, Node, NodeId, NodeKind};
pub use node_graph::NodeGraph;
pub use path::DependencyPath;
pub use value::{FootageRef, Value};
