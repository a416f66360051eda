pub mod intent;
pub mod phonetic;
pub mod registry;
pub mod resolver;
pub mod router;

pub use intent::{
    is_camera_intent, IntentRule, IntentRuleSet, BROWSE_INTENT, CAMERA_INTENT, IOT_INTENT,
    NETWORK_INTENT,
};
pub use registry::{CapabilityRegistry, RegistryEvent};
pub use resolver::{Resolution, ResolutionKind, TargetResolver};
pub use router::{IntentRouter, ROUTER_ID};
