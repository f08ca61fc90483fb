mod api_key;
mod tracing_layer;
mod metrics_layer;

pub use api_key::*;
pub use tracing_layer::*;
pub use metrics_layer::*;
