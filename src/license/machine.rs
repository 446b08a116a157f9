/// Correlation token sent with every validation request: `<hostname>-<os>`.
///
/// Derived locally with no external calls. It identifies a host to the
/// license manager and is not a credential.
pub fn machine_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("{}-{}", host, std::env::consts::OS)
}
