//! JWT layer: claims, keys, signing and the parsed token type.

pub mod claims;
pub mod keys;
pub mod serializer;
pub mod token;

pub use claims::ClaimSet;
pub use keys::{KeyMaterial, SigningKeys};
pub use serializer::TokenSerializer;
pub use token::SignedToken;
