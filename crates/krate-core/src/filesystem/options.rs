//! Mount option string parsing.
//!
//! Splits a `mount(8)`-style option list such as `ro,nosuid,bind` into the
//! kernel flag mask and the filesystem-specific data string passed as the
//! last argument of `mount(2)`.

use nix::mount::MsFlags;

/// Result of parsing a mount option string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Kernel mount flags.
    pub flags: MsFlags,
    /// Comma-joined options the kernel flag table does not know.
    pub data: String,
}

impl MountOptions {
    /// Returns the data string, or `None` when it is empty.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        (!self.data.is_empty()).then_some(self.data.as_str())
    }
}

/// One symbolic option: `clear` options remove `flag`, the others set it.
struct FlagOption {
    name: &'static str,
    clear: bool,
    flag: MsFlags,
}

const fn set(name: &'static str, flag: MsFlags) -> FlagOption {
    FlagOption {
        name,
        clear: false,
        flag,
    }
}

const fn clear(name: &'static str, flag: MsFlags) -> FlagOption {
    FlagOption {
        name,
        clear: true,
        flag,
    }
}

const FLAG_OPTIONS: &[FlagOption] = &[
    set("defaults", MsFlags::empty()),
    set("ro", MsFlags::MS_RDONLY),
    clear("rw", MsFlags::MS_RDONLY),
    set("nosuid", MsFlags::MS_NOSUID),
    clear("suid", MsFlags::MS_NOSUID),
    set("nodev", MsFlags::MS_NODEV),
    clear("dev", MsFlags::MS_NODEV),
    set("noexec", MsFlags::MS_NOEXEC),
    clear("exec", MsFlags::MS_NOEXEC),
    set("sync", MsFlags::MS_SYNCHRONOUS),
    clear("async", MsFlags::MS_SYNCHRONOUS),
    set("dirsync", MsFlags::MS_DIRSYNC),
    set("remount", MsFlags::MS_REMOUNT),
    set("mand", MsFlags::MS_MANDLOCK),
    clear("nomand", MsFlags::MS_MANDLOCK),
    set("noatime", MsFlags::MS_NOATIME),
    clear("atime", MsFlags::MS_NOATIME),
    set("nodiratime", MsFlags::MS_NODIRATIME),
    clear("diratime", MsFlags::MS_NODIRATIME),
    set("relatime", MsFlags::MS_RELATIME),
    clear("norelatime", MsFlags::MS_RELATIME),
    set("strictatime", MsFlags::MS_STRICTATIME),
    clear("nostrictatime", MsFlags::MS_STRICTATIME),
    set("bind", MsFlags::MS_BIND),
    set("rbind", MsFlags::MS_BIND.union(MsFlags::MS_REC)),
    set("private", MsFlags::MS_PRIVATE),
    set("rprivate", MsFlags::MS_PRIVATE.union(MsFlags::MS_REC)),
    set("slave", MsFlags::MS_SLAVE),
    set("rslave", MsFlags::MS_SLAVE.union(MsFlags::MS_REC)),
    set("shared", MsFlags::MS_SHARED),
    set("rshared", MsFlags::MS_SHARED.union(MsFlags::MS_REC)),
    set("unbindable", MsFlags::MS_UNBINDABLE),
    set("runbindable", MsFlags::MS_UNBINDABLE.union(MsFlags::MS_REC)),
];

/// Parses a comma-separated mount option string.
///
/// Unknown tokens are never an error: they are forwarded verbatim in
/// [`MountOptions::data`] for the filesystem driver to interpret.
#[must_use]
pub fn parse_mount_options(options: &str) -> MountOptions {
    let mut flags = MsFlags::empty();
    let mut data: Vec<&str> = Vec::new();

    for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match FLAG_OPTIONS.iter().find(|opt| opt.name == token) {
            Some(opt) if opt.clear => flags.remove(opt.flag),
            Some(opt) => flags.insert(opt.flag),
            None => data.push(token),
        }
    }

    MountOptions {
        flags,
        data: data.join(","),
    }
}
