/// Whether `s` looks like a JID (`local@domain`, optional `/resource`)
pub fn is_jid_shaped(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return false;
    }
    let bare = s.split('/').next().unwrap_or(s);
    match bare.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Normalise to the bare, lowercase form used as a ban key.
///
/// Rooms key affiliations by bare JID, so the resource is dropped.
pub fn bare_jid(s: &str) -> String {
    let s = s.trim();
    let bare = s.split('/').next().unwrap_or(s);
    bare.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jid_shape() {
        assert!(is_jid_shaped("eve@example.org"));
        assert!(is_jid_shaped("eve@example.org/phone"));
        assert!(!is_jid_shaped("eve"));
        assert!(!is_jid_shaped("@example.org"));
        assert!(!is_jid_shaped("eve@"));
        assert!(!is_jid_shaped("eve smith@example.org"));
    }

    #[test]
    fn test_bare_jid() {
        assert_eq!(bare_jid("Eve@Example.org/Phone"), "eve@example.org");
        assert_eq!(bare_jid(" bob@example.org "), "bob@example.org");
    }
}
