//! Recovery of a handler's declared name from the runtime's mangled
//! registration name.
//!
//! A route captured from a live router carries the compiler-synthesized
//! name of the function that was registered, encoding the whole call chain
//! that produced it, e.g.
//! `example.com/svc/internal/api.(*Server).setup.LoginHandler.func1`.
//!
//! The grammar handled here is:
//!
//! ```text
//! mangled   = segment { "." segment } [ "-fm" ]
//! segment   = package path piece | "(*Type)" | identifier | closure
//! closure   = "func" digits | digits
//! ```
//!
//! The declared name is the last segment that is not a closure marker.
//! Trailing `digits` segments arise from nested closures (`func1.2`), and
//! the `-fm` suffix from method-value registrations.

/// Recovers the declared handler name from a mangled registration name.
pub fn handler_name(mangled: &str) -> &str {
    let mangled = mangled.strip_suffix("-fm").unwrap_or(mangled);

    let segments: Vec<&str> = mangled.split('.').collect();
    let mut idx = segments.len() - 1;
    while idx > 0 && is_closure_marker(segments[idx]) {
        idx -= 1;
    }
    segments[idx]
}

/// Whether a segment is an anonymous-closure marker: `funcN`, or a bare
/// digit run left over from splitting a nested marker like `func1.2`.
fn is_closure_marker(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    let digits = segment.strip_prefix("func").unwrap_or(segment);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_wrapped_method_chain() {
        assert_eq!(
            handler_name("example.com/svc/internal/api.(*Server).setup.LoginHandler.func1"),
            "LoginHandler"
        );
    }

    #[test]
    fn test_plain_package_function() {
        assert_eq!(handler_name("pkg.LoginHandler"), "LoginHandler");
    }

    #[test]
    fn test_single_identifier() {
        assert_eq!(handler_name("LoginHandler"), "LoginHandler");
    }

    #[test]
    fn test_nested_closure_marker() {
        assert_eq!(
            handler_name("example.com/svc/api.MakeHandler.func1.2"),
            "MakeHandler"
        );
    }

    #[test]
    fn test_method_value_suffix() {
        assert_eq!(
            handler_name("example.com/svc/api.(*Server).ListUsers-fm"),
            "ListUsers"
        );
    }

    #[test]
    fn test_method_value_suffix_behind_closure() {
        assert_eq!(
            handler_name("example.com/svc/api.(*Server).mapUsers.CreateUser.func2"),
            "CreateUser"
        );
    }

    #[test]
    fn test_handler_named_like_func_is_not_a_marker() {
        // "funcs" and "funcX" are legal identifiers, not closure markers
        assert_eq!(handler_name("pkg.funcs"), "funcs");
        assert_eq!(handler_name("pkg.funcX"), "funcX");
    }

    #[test]
    fn test_domain_dots_do_not_confuse_recovery() {
        assert_eq!(
            handler_name("example.com/svc/api.HealthCheck"),
            "HealthCheck"
        );
    }

    #[test]
    fn test_closure_markers() {
        assert!(is_closure_marker("func1"));
        assert!(is_closure_marker("func12"));
        assert!(is_closure_marker("2"));
        assert!(!is_closure_marker("func"));
        assert!(!is_closure_marker("funcs"));
        assert!(!is_closure_marker("LoginHandler"));
        assert!(!is_closure_marker(""));
    }
}
