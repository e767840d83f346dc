//! System-wide constants and default paths.

/// Directory holding `<identity>.xml` zone manifests.
pub const DEFAULT_MANIFEST_DIR: &str = "/etc/krate";

/// Manifest used when no identity-specific manifest exists.
pub const FALLBACK_MANIFEST: &str = "owner.xml";

/// Extension of identity-specific manifests.
pub const MANIFEST_EXTENSION: &str = "xml";

/// Directory holding one session registry file per identity.
pub const DEFAULT_REGISTRY_DIR: &str = "/run/krate";

/// Name of the host-wide named semaphore guarding registry mutation.
pub const DEFAULT_SEMAPHORE_NAME: &str = "/krate-session";

/// Shell started by the operator CLI when no command is given.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Default location of the optional JSON configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/krate/krate.json";

/// Prefix substituted for `%HOME%` in manifest paths.
pub const HOME_PREFIX: &str = "/home";

/// Prefix substituted for `%RUN%` in manifest paths.
pub const RUN_USER_PREFIX: &str = "/run/user";
