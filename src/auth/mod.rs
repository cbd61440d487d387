pub mod credentials;
pub mod password;

pub use credentials::{AccessKey, Credentials, HashScheme, PasswordUser};
