pub mod metadata;
pub mod path_token;
