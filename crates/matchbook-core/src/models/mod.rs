pub mod error;
pub mod explanation;
pub mod profile;

pub use error::{CoreError, CoreErrorKind};
pub use explanation::{
    CacheEntry, Explanation, ExplanationSource, NewCacheEntry, PairKey, Perspective, ProjectKey,
    SeekerKey,
};
pub use profile::{ProjectProfile, SeekerProfile};
