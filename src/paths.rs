use color_eyre::eyre::bail;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "RCLONE_TRAY_DATA_DIR";
pub const CONFIG_ENV: &str = "RCLONE_TRAY_CONFIG";

#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
    config_file: PathBuf,
}

impl Paths {
    pub fn new() -> color_eyre::Result<Self> {
        let data_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let Some(base) = dirs::data_dir() else {
                    bail!("could not determine data directory");
                };
                base.join("rclone-tray")
            }
        };

        let config_file = match std::env::var(CONFIG_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let Some(base) = dirs::config_dir() else {
                    bail!("could not determine config directory");
                };
                base.join("rclone-tray").join("config.toml")
            }
        };

        Ok(Self {
            data_dir,
            config_file,
        })
    }

    /// Everything (config included) under a single directory.
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.toml"),
            data_dir: base,
        }
    }

    pub fn with_config_file(mut self, config_file: PathBuf) -> Self {
        self.config_file = config_file;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn log_file_name(&self) -> &'static str {
        "rclone-tray.log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_data_dir_linux() {
        if std::env::var(DATA_DIR_ENV).is_ok() {
            return;
        }
        let paths = Paths::new().unwrap();
        let data_dir = paths.data_dir().to_str().unwrap();
        assert!(
            data_dir.ends_with(".local/share/rclone-tray") || data_dir.contains("rclone-tray"),
            "expected Linux data dir, got: {data_dir}"
        );
    }

    #[test]
    fn test_with_base_keeps_config_under_base() {
        let paths = Paths::with_base(PathBuf::from("/tmp/rclone-tray-test"));
        assert!(paths.config_file().starts_with(paths.data_dir()));
        assert!(paths.config_file().ends_with("config.toml"));
    }

    #[test]
    fn test_log_dir_under_data_dir() {
        let paths = Paths::with_base(PathBuf::from("/tmp/rclone-tray-test"));
        let log_dir = paths.log_dir();
        assert!(log_dir.starts_with(paths.data_dir()));
        assert!(log_dir.ends_with("logs"));
    }

    #[test]
    fn test_config_file_override() {
        let paths = Paths::with_base(PathBuf::from("/tmp/rclone-tray-test"))
            .with_config_file(PathBuf::from("/etc/rclone-tray.toml"));
        assert_eq!(paths.config_file(), Path::new("/etc/rclone-tray.toml"));
        assert_eq!(paths.data_dir(), Path::new("/tmp/rclone-tray-test"));
    }
}
