pub mod codec;
pub mod error;
pub mod hashing;
pub mod params;
pub mod poly;
pub mod receiver;
pub mod sender;
pub mod utils;
pub use fhe;
pub use fhe_traits;

pub use error::Error;
pub use hashing::{BucketSlot, HASH_FUNCTIONS};
pub use params::{ParamsAnnouncement, PsiParams};
pub use receiver::PsiReceiver;
pub use sender::{NoiseObserver, PsiSender};
