/// Text reported when a probe completes without printing anything.
pub const EMPTY_OUTPUT_PLACEHOLDER: &str = "Ping completed";

/// Decides whether a completed probe succeeded, returning the verdict and the
/// output to report.
///
/// Success means the trimmed output is non-empty and mentions neither
/// `false` nor `failed` in any case. This is string sniffing, not parsing;
/// callers only depend on this function so it can be swapped for structured
/// parsing of the probe program's output.
pub fn classify_output(raw: &str) -> (bool, String) {
    let output = raw.trim();
    let lowered = output.to_lowercase();
    let success = !output.is_empty() && !lowered.contains("false") && !lowered.contains("failed");

    let output = if output.is_empty() {
        EMPTY_OUTPUT_PLACEHOLDER.to_string()
    } else {
        output.to_string()
    };

    (success, output)
}
