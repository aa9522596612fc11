//! Build profiles.
//!
//! A profile is everything that differs between Pardus releases: which
//! repositories to register, what to install, which chroot fix-ups to run and
//! what to prune afterwards. The workflow itself never changes between
//! releases; only the profile handed to it does.
//!
//! Profiles are plain data and round-trip through JSON, so a custom release
//! can be described in a file and passed with `--profile-file`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};

/// Profile used when none is selected.
pub const DEFAULT_PROFILE: &str = "pardus-2008";

/// Built-in profile names, oldest first.
pub const PROFILE_NAMES: &[&str] = &["pardus-2007", "pardus-2008"];

/// A package repository registered for the install phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

impl Repository {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// The message bus started inside the chroot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSpec {
    /// Run before the daemon to create the machine identity if absent.
    #[serde(default)]
    pub machine_id: Option<Vec<String>>,
    /// Daemon command, launched detached.
    pub daemon: Vec<String>,
    /// Socket the daemon listens on, relative to the target.
    pub socket: String,
    /// Stops the daemon once provisioning is done. Errors are ignored.
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    /// Primary group; must exist by the time the user is created.
    pub group: String,
    pub home: String,
    pub shell: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootAccount {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// File name prefix of kernel images under `boot/`, e.g. `kernel-`.
    pub image_prefix: String,
    /// File name prefix of initramfs images under `boot/`.
    #[serde(default)]
    pub initramfs_prefix: Option<String>,
    /// Initramfs generator run inside the chroot. `{version}` is replaced
    /// with the kernel version.
    #[serde(default)]
    pub initramfs_generator: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Char,
    Block,
}

impl DeviceKind {
    /// Type letter as understood by mknod(1).
    pub fn letter(self) -> &'static str {
        match self {
            DeviceKind::Char => "c",
            DeviceKind::Block => "b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Path relative to the target, e.g. `dev/null`.
    pub path: String,
    pub kind: DeviceKind,
    pub major: u32,
    pub minor: u32,
    pub mode: u32,
}

impl DeviceNode {
    fn char(path: &str, major: u32, minor: u32, mode: u32) -> Self {
        Self {
            path: path.to_string(),
            kind: DeviceKind::Char,
            major,
            minor,
            mode,
        }
    }
}

/// A `(directory, glob)` shrink rule. Every entry below `dir` whose file name
/// matches `pattern` is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobRule {
    pub dir: String,
    pub pattern: String,
}

impl GlobRule {
    pub fn new(dir: &str, pattern: &str) -> Self {
        Self {
            dir: dir.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkSpec {
    /// Literal paths relative to the target.
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub rules: Vec<GlobRule>,
}

/// Everything release specific about a client image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// Single line written to `etc/pardus-release`.
    pub release: String,
    pub repository: Repository,
    #[serde(default)]
    pub extra_repositories: Vec<Repository>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    /// Passed as `--exclude` to component installs only.
    #[serde(default)]
    pub component_excludes: Vec<String>,
    /// Chroot commands run before the bus starts.
    #[serde(default)]
    pub prepare: Vec<Vec<String>>,
    pub bus: BusSpec,
    /// Chroot commands run once the bus is up.
    #[serde(default)]
    pub post_bus: Vec<Vec<String>>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    pub root: RootAccount,
    /// Chroot commands run after the bus is stopped, before depmod.
    #[serde(default)]
    pub pre_kernel: Vec<Vec<String>>,
    pub kernel: KernelSpec,
    #[serde(default)]
    pub devices: Vec<DeviceNode>,
    /// Chroot commands run after the release marker is written.
    #[serde(default)]
    pub finalize: Vec<Vec<String>>,
    #[serde(default)]
    pub shrink: ShrinkSpec,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_devices() -> Vec<DeviceNode> {
    vec![
        DeviceNode::char("dev/null", 1, 3, 0o666),
        DeviceNode::char("dev/console", 5, 1, 0o600),
        DeviceNode::char("dev/urandom", 1, 9, 0o666),
    ]
}

impl Profile {
    /// Look up a built-in profile by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "pardus-2007" => Some(Self::pardus_2007()),
            "pardus-2008" => Some(Self::pardus_2008()),
            _ => None,
        }
    }

    /// Load a profile from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        let profile: Profile = serde_json::from_str(&content)
            .with_context(|| format!("Invalid profile {}", path.display()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Pick the profile file if given, otherwise the named built-in.
    pub fn resolve(name: &str, file: Option<&Path>) -> Result<Self> {
        if let Some(path) = file {
            return Self::from_file(path);
        }
        match Self::builtin(name) {
            Some(profile) => Ok(profile),
            None => bail!(
                "Unknown profile '{}'. Available: {}",
                name,
                PROFILE_NAMES.join(", ")
            ),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject profiles that could touch anything outside the target.
    pub fn validate(&self) -> Result<()> {
        if self.release.trim().is_empty() || self.release.contains('\n') {
            bail!("Profile '{}': release must be a single non-empty line", self.name);
        }
        if self.bus.daemon.is_empty() {
            bail!("Profile '{}': bus daemon command is empty", self.name);
        }
        if self.kernel.image_prefix.is_empty() {
            bail!("Profile '{}': kernel image prefix is empty", self.name);
        }

        let relative = std::iter::once(self.bus.socket.as_str())
            .chain(self.devices.iter().map(|d| d.path.as_str()))
            .chain(self.shrink.paths.iter().map(String::as_str))
            .chain(self.shrink.rules.iter().map(|r| r.dir.as_str()));
        for path in relative {
            if !is_confined(path) {
                bail!(
                    "Profile '{}': '{}' must be a relative path inside the target",
                    self.name,
                    path
                );
            }
        }

        for cmd in self
            .prepare
            .iter()
            .chain(&self.post_bus)
            .chain(&self.pre_kernel)
            .chain(&self.finalize)
        {
            if cmd.is_empty() {
                bail!("Profile '{}': empty chroot command", self.name);
            }
        }
        Ok(())
    }

    /// Pardus 2007 client, the first PTSP release.
    pub fn pardus_2007() -> Self {
        Self {
            name: "pardus-2007".to_string(),
            release: "Pardus 2007".to_string(),
            repository: Repository::new(
                "pardus-2007",
                "http://paketler.pardus.org.tr/pardus-2007/pisi-index.xml.bz2",
            ),
            extra_repositories: vec![Repository::new(
                "ptsp-2007",
                "http://paketler.pardus.org.tr/ptsp-2007/pisi-index.xml.bz2",
            )],
            components: owned(&["system.base"]),
            packages: owned(&["xorg-server", "ptsp-client"]),
            component_excludes: Vec::new(),
            prepare: vec![owned(&["/sbin/ldconfig"]), owned(&["/sbin/update-environment"])],
            bus: BusSpec {
                machine_id: None,
                daemon: owned(&["/usr/bin/comar"]),
                socket: "var/run/comar.socket".to_string(),
                stop: Some(owned(&["/usr/bin/comar", "--stop"])),
            },
            post_bus: vec![
                owned(&[
                    "/usr/bin/hav",
                    "call-package",
                    "System.Package.postInstall",
                    "baselayout",
                ]),
                owned(&["/usr/bin/pisi", "configure-pending"]),
            ],
            groups: Vec::new(),
            users: Vec::new(),
            root: RootAccount {
                password: Some("pardus".to_string()),
                shell: None,
            },
            pre_kernel: vec![owned(&["/sbin/update-modules"])],
            kernel: KernelSpec {
                image_prefix: "kernel-".to_string(),
                initramfs_prefix: None,
                initramfs_generator: None,
            },
            devices: default_devices(),
            finalize: vec![owned(&["/usr/bin/pisi", "delete-cache"])],
            shrink: ShrinkSpec {
                paths: owned(&["lib/udev/devices"]),
                rules: Vec::new(),
            },
        }
    }

    /// Pardus 2008 client: D-Bus based bus, audio and fuse accounts,
    /// initramfs and a much larger shrink list.
    pub fn pardus_2008() -> Self {
        Self {
            name: "pardus-2008".to_string(),
            release: "Pardus 2008".to_string(),
            repository: Repository::new(
                "pardus-2008",
                "http://paketler.pardus.org.tr/pardus-2008/pisi-index.xml.bz2",
            ),
            extra_repositories: Vec::new(),
            components: owned(&["system.base"]),
            packages: owned(&[
                "kernel",
                "xorg-server",
                "xorg-video",
                "xorg-input",
                "xorg-font",
                "pulseaudio",
                "alsa-utils",
                "fuse",
                "lbuscd",
                "ltspfsd",
                "ptsp-client",
            ]),
            component_excludes: owned(&[
                "/usr/share/doc",
                "/usr/share/man",
                "/usr/share/info",
                "/usr/share/gtk-doc",
                "/usr/include",
            ]),
            prepare: vec![owned(&["/sbin/ldconfig"]), owned(&["/sbin/update-environment"])],
            bus: BusSpec {
                machine_id: Some(owned(&["/usr/bin/dbus-uuidgen", "--ensure"])),
                daemon: owned(&["/usr/bin/dbus-daemon", "--system"]),
                socket: "var/run/dbus/system_bus_socket".to_string(),
                stop: Some(owned(&["/bin/service", "dbus", "stop"])),
            },
            post_bus: vec![
                owned(&[
                    "/usr/bin/hav",
                    "call-package",
                    "System.Package.postInstall",
                    "baselayout",
                ]),
                owned(&["/usr/bin/pisi", "configure-pending"]),
            ],
            groups: vec![
                GroupSpec {
                    name: "pulse".to_string(),
                    gid: None,
                    system: true,
                },
                GroupSpec {
                    name: "fuse".to_string(),
                    gid: None,
                    system: true,
                },
            ],
            users: vec![UserSpec {
                name: "pulse".to_string(),
                group: "pulse".to_string(),
                home: "/var/run/pulse".to_string(),
                shell: "/bin/false".to_string(),
                comment: "PulseAudio daemon".to_string(),
                system: true,
            }],
            root: RootAccount {
                password: Some("pardus".to_string()),
                shell: Some("/bin/bash".to_string()),
            },
            pre_kernel: Vec::new(),
            kernel: KernelSpec {
                image_prefix: "kernel-".to_string(),
                initramfs_prefix: Some("initramfs-".to_string()),
                initramfs_generator: Some(owned(&["/sbin/mkinitramfs", "--kernel", "{version}"])),
            },
            devices: default_devices(),
            finalize: vec![owned(&["/usr/bin/pisi", "delete-cache"])],
            shrink: ShrinkSpec {
                paths: owned(&[
                    "usr/include",
                    "usr/share/doc",
                    "usr/share/man",
                    "usr/share/info",
                    "usr/share/gtk-doc",
                    "usr/lib/pkgconfig",
                    "var/cache/pisi",
                    "lib/udev/devices",
                ]),
                rules: vec![
                    GlobRule::new("usr/lib", "*.a"),
                    GlobRule::new("usr/lib", "*.la"),
                    GlobRule::new("lib", "*.a"),
                    GlobRule::new("usr/share/locale", "*.mo"),
                ],
            },
        }
    }
}

/// True for relative paths without `..` components.
pub fn is_confined(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_validate() {
        for name in PROFILE_NAMES {
            let profile = Profile::builtin(name).unwrap();
            assert_eq!(&profile.name, name);
            profile.validate().unwrap();
        }
    }

    #[test]
    fn default_profile_is_builtin() {
        assert!(Profile::builtin(DEFAULT_PROFILE).is_some());
    }

    #[test]
    fn unknown_profile_lists_choices() {
        let err = Profile::resolve("pardus-1999", None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pardus-1999"));
        assert!(msg.contains("pardus-2008"));
    }

    #[test]
    fn profile_file_overrides_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        let mut custom = Profile::pardus_2008();
        custom.name = "custom".to_string();
        custom.packages = vec!["nano".to_string()];
        fs::write(&path, custom.to_json().unwrap()).unwrap();

        let loaded = Profile::resolve("pardus-2007", Some(&path)).unwrap();
        assert_eq!(loaded, custom);
    }

    #[test]
    fn minimal_profile_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("min.json");
        fs::write(
            &path,
            r#"{
                "name": "min",
                "release": "Pardus Mini",
                "repository": {"name": "mini", "url": "file:///srv/mini/pisi-index.xml"},
                "packages": ["busybox"],
                "bus": {"daemon": ["/usr/bin/comar"], "socket": "var/run/comar.socket"},
                "root": {},
                "kernel": {"image_prefix": "kernel-"}
            }"#,
        )
        .unwrap();

        let profile = Profile::from_file(&path).unwrap();
        assert!(profile.components.is_empty());
        assert!(profile.devices.is_empty());
        assert!(profile.shrink.rules.is_empty());
        assert_eq!(profile.root.password, None);
    }

    #[test]
    fn escaping_shrink_path_is_rejected() {
        let mut profile = Profile::pardus_2008();
        profile.shrink.paths.push("../etc".to_string());
        assert!(profile.validate().is_err());

        let mut profile = Profile::pardus_2008();
        profile.shrink.rules.push(GlobRule::new("/usr", "*"));
        assert!(profile.validate().is_err());
    }

    #[test]
    fn multi_line_release_is_rejected() {
        let mut profile = Profile::pardus_2007();
        profile.release = "Pardus\n2007".to_string();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn confinement() {
        assert!(is_confined("usr/share/doc"));
        assert!(is_confined("./dev/null"));
        assert!(!is_confined("/usr"));
        assert!(!is_confined("usr/../.."));
        assert!(!is_confined(""));
    }
}
