pub mod parser;
pub mod secret;

pub use parser::{
    DsnComponents, extract_database, extract_endpoint, extract_options, extract_username,
    parse_dsn, resolve_username,
};
pub use secret::{encode_secret_if_needed, is_percent_encoded, replace_secret, strip_secret};
