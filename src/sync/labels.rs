use crate::update::{UpdateGroup, UpdateType};

pub const SECURITY_LABEL: &str = "security";

/// Name fragments of packages whose updates deserve a security review.
const SECURITY_TERMS: &[&str] = &[
    "crypto", "auth", "jwt", "ssl", "tls", "security", "helmet", "bcrypt",
    "passport", "oauth",
];

pub fn is_security_sensitive(name: &str) -> bool {
    let name = name.to_lowercase();
    SECURITY_TERMS.iter().any(|term| name.contains(term))
}

/// Labels for a group's pull request: the update types present, `security`
/// when a sensitive package is included, then the configured labels.
pub fn labels_for(group: &UpdateGroup, configured: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = vec![];

    for update_type in [UpdateType::Major, UpdateType::Minor, UpdateType::Patch] {
        if group.updates.iter().any(|u| u.update_type == update_type) {
            labels.push(update_type.as_str().into());
        }
    }

    if group.updates.iter().any(|u| is_security_sensitive(&u.name)) {
        labels.push(SECURITY_LABEL.into());
    }

    for label in configured.iter() {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }

    labels
}
