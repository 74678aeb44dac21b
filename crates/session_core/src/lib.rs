pub mod category;
pub mod credentials;
pub mod error;
pub mod manifest;
pub mod traits;

pub mod prelude {
    pub use super::category::*;
    pub use super::credentials::*;
    pub use super::error::*;
    pub use super::manifest::*;
    pub use super::traits::*;
}
