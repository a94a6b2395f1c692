#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// Table definitions, applied on every start.
pub const SCHEMA: &str = include_res!(str, "/schema.sql");

/// Shown by `/privacy` unless `PRIVACY_TEXT` overrides it.
pub const PRIVACY: &str = include_res!(str, "/privacy.txt");
