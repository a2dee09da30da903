use std::{env, path::PathBuf};

use tokio::fs;

const APP_NAME: &str = "git-engine";

fn port_file_path(app_name: &str) -> PathBuf {
    env::temp_dir().join(app_name).join(format!("{app_name}.port"))
}

/// Publish the bound port so the desktop shell can find the engine.
pub async fn write_port_file(port: u16) -> std::io::Result<PathBuf> {
    let path = port_file_path(APP_NAME);
    tracing::debug!("Writing port {} to {:?}", port, path);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    fs::write(&path, port.to_string()).await?;
    Ok(path)
}

pub async fn read_port_file() -> std::io::Result<u16> {
    let path = port_file_path(APP_NAME);
    let content = fs::read_to_string(&path).await?;
    content
        .trim()
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
