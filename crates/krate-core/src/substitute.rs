//! Identity placeholder expansion for manifest path templates.

use krate_common::constants::{HOME_PREFIX, RUN_USER_PREFIX};
use krate_common::types::Identity;

/// Replaces every `%USER%`, `%UID%`, `%GROUP%`, `%GID%`, `%HOME%`, and
/// `%RUN%` token in `template` with the matching identity field.
///
/// `%HOME%` expands to `/home/<name>` and `%RUN%` to `/run/user/<uid>`,
/// independent of the home directory stored in the user database.
#[must_use]
pub fn substitute(template: &str, identity: &Identity) -> String {
    if !template.contains('%') {
        return template.to_string();
    }

    let tokens = [
        ("%USER%", identity.name.clone()),
        ("%UID%", identity.uid.to_string()),
        ("%GROUP%", identity.group.clone()),
        ("%GID%", identity.gid.to_string()),
        ("%HOME%", format!("{HOME_PREFIX}/{}", identity.name)),
        ("%RUN%", format!("{RUN_USER_PREFIX}/{}", identity.uid)),
    ];

    tokens
        .iter()
        .fold(template.to_string(), |acc, (token, value)| acc.replace(*token, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            name: "alice".into(),
            uid: 1000,
            group: "users".into(),
            gid: 100,
        }
    }

    #[test]
    fn home_and_user_expand() {
        assert_eq!(substitute("%HOME%/%USER%", &alice()), "/home/alice/alice");
    }

    #[test]
    fn template_without_tokens_is_unchanged() {
        assert_eq!(substitute("/srv/zoneA", &alice()), "/srv/zoneA");
        assert_eq!(substitute("100%", &alice()), "100%");
    }

    #[test]
    fn all_tokens_expand() {
        assert_eq!(
            substitute("%USER%:%UID%:%GROUP%:%GID%:%RUN%", &alice()),
            "alice:1000:users:100:/run/user/1000"
        );
    }

    #[test]
    fn repeated_tokens_all_expand() {
        assert_eq!(substitute("%UID%-%UID%", &alice()), "1000-1000");
    }
}
