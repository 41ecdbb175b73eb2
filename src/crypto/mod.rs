pub mod key_management;
pub mod sealing;
pub mod signatures;

pub use key_management::SigningKey;
pub use sealing::{Aes256GcmSealer, FieldSealer, SealContext, SealedField};
pub use signatures::EntrySigner;
