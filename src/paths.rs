use std::path::PathBuf;

/// Install root that every default location hangs off: `~/.local/share/vmprov/`
pub fn install_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vmprov")
}

/// Default manifest: `<root>/configs/instances.json`
pub fn manifest_path() -> PathBuf {
    install_root().join("configs").join("instances.json")
}

/// Default provisioning script: `<root>/scripts/init_vm.sh`
pub fn script_path() -> PathBuf {
    install_root().join("scripts").join("init_vm.sh")
}

/// Default log directory: `<root>/logs/`
pub fn logs_dir() -> PathBuf {
    install_root().join("logs")
}

/// Optional settings file: `~/.config/vmprov/vmprov.toml`
pub fn config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("vmprov")
        .join("vmprov.toml")
}

/// Name of the log file written inside the logs directory.
pub const LOG_FILE_NAME: &str = "provisioning.log";
