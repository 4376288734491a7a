pub mod model_gateway;

pub use model_gateway::{bounded_messages, Completion, GatewaySettings, ModelGateway, RetryPolicy};
