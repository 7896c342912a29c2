/// One source contributing to a device's configuration blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// A file read with `cat`; globs are expanded by the remote shell.
    File(&'static str),
    Command(&'static str),
}

/// Sources collected for a Linux host's network configuration, in section order.
pub const CONFIG_SOURCES: [ConfigSource; 5] = [
    ConfigSource::File("/etc/network/interfaces"),
    ConfigSource::File("/etc/netplan/*.yaml"),
    ConfigSource::File("/etc/sysctl.conf"),
    ConfigSource::Command("ip route"),
    ConfigSource::Command("ip addr"),
];

impl ConfigSource {
    pub fn label(self) -> &'static str {
        match self {
            ConfigSource::File(path) => path,
            ConfigSource::Command(cmd) => cmd,
        }
    }

    pub fn command(self) -> String {
        match self {
            ConfigSource::File(path) => format!("cat {path} 2>/dev/null"),
            ConfigSource::Command(cmd) => cmd.to_string(),
        }
    }
}

/// Concatenate outputs under `### label ###` headers, in the given order.
/// Sources without output (or with only whitespace) add no section.
pub fn assemble_config_blob(sources: &[(&str, Option<&str>)]) -> String {
    let mut blob = String::new();
    for (label, output) in sources {
        let Some(output) = output.filter(|o| !o.trim().is_empty()) else {
            continue;
        };
        blob.push_str("\n### ");
        blob.push_str(label);
        blob.push_str(" ###\n");
        blob.push_str(output);
        blob.push('\n');
    }
    blob
}
