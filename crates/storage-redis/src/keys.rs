//! Backend key composition for the Redis adapter.
//!
//! Each item is one Redis record under the composed key
//! `t:<tenant>:n:<namespace>:u:<user>:k:<key>`. Scope components are
//! produced by the identity resolver; the item key is the only
//! caller-controlled part and sits in the terminal position, so callers
//! cannot forge their way into another scope.

use stash_storage::Scope;

/// Composes the full backend key for an item.
pub(crate) fn backend_key(scope: &Scope, key: &str) -> String {
    format!("{}{key}", scope_prefix(scope))
}

/// The key prefix shared by every item in a scope, ending in `:k:`.
pub(crate) fn scope_prefix(scope: &Scope) -> String {
    format!("t:{}:n:{}:u:{}:k:", scope.tenant_id(), scope.namespace(), scope.user_id())
}

/// Builds a `SCAN MATCH` pattern covering a scope, optionally narrowed by
/// an item-key prefix. Glob metacharacters in the scope and prefix are
/// escaped so they match literally.
pub(crate) fn scan_pattern(scope: &Scope, prefix: Option<&str>) -> String {
    let mut pattern = escape_glob(&scope_prefix(scope));
    if let Some(prefix) = prefix {
        pattern.push_str(&escape_glob(prefix));
    }
    pattern.push('*');
    pattern
}

/// Escapes Redis glob metacharacters (`*`, `?`, `[`, `]`, `\`).
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new("acme", "web", "u1").unwrap()
    }

    #[test]
    fn backend_key_layout() {
        assert_eq!(backend_key(&scope(), "sidebar"), "t:acme:n:web:u:u1:k:sidebar");
    }

    #[test]
    fn item_key_recovered_by_stripping_the_scope_prefix() {
        let bkey = backend_key(&scope(), "a:b:c");
        assert_eq!(bkey.strip_prefix(&scope_prefix(&scope())), Some("a:b:c"));
    }

    #[test]
    fn scan_pattern_covers_scope_and_prefix() {
        assert_eq!(scan_pattern(&scope(), None), "t:acme:n:web:u:u1:k:*");
        assert_eq!(scan_pattern(&scope(), Some("user:")), "t:acme:n:web:u:u1:k:user:*");
    }

    #[test]
    fn scan_pattern_escapes_glob_metacharacters() {
        let scope = Scope::new("a*b", "n?s", "u[1]").unwrap();
        let pattern = scan_pattern(&scope, Some("p*"));
        assert_eq!(pattern, "t:a\\*b:n:n\\?s:u:u\\[1\\]:k:p\\**");
    }
}
