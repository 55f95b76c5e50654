/// Canonicalize a section/row/column code: purely numeric codes lose their
/// leading zeros (`"007"` → `"7"`), anything else is kept verbatim.
///
/// Report and template documents are inconsistent about zero padding, so
/// every code is squeezed through this before it becomes a map key.
pub fn canon_code(code: &str) -> String {
    let trimmed = code.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    } else {
        trimmed.to_string()
    }
}
