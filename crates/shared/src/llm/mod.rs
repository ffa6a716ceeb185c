pub mod gateway;
pub mod messages;
pub mod profiles;
mod sse;

pub use gateway::{
    INVALID_REQUEST_MESSAGE, InferenceParams, ModelDelta, ModelError, ModelGateway, ModelRequest,
    ModelStream, ModelStreamFuture, THROTTLED_MESSAGE, collect_text, complete,
};
pub use messages::{MessagesGateway, MessagesGatewayConfig, ModelGatewayConfigError};
pub use profiles::{
    DEFAULT_PROFILE_KEY, MODEL_PROFILES, ModelProfile, SamplingSettings, profile_for_key,
};
