//! Deployment-artifact generation, adapted from
//! `daemon.rs::generate_systemd_service`/`generate_cron_job`/
//! `generate_docker_compose` for this service's `daemon`/`generate`/
//! `cleanup` CLI surface instead of OHLC/portfolio flags.

use anyhow::Result;
use std::fs;
use std::path::Path;

pub fn generate_systemd_service(output_dir: &Path, binary_name: &str, config_path: &str) -> Result<()> {
    let service_content = format!(
        "[Unit]
Description=Moyuren Calendar Image Daemon
After=network.target

[Service]
Type=simple
User=moyuren
WorkingDirectory=/opt/moyuren
ExecStart=/opt/moyuren/{binary_name} daemon --config {config_path}
Restart=always
RestartSec=10
Environment=RUST_LOG=info

[Install]
WantedBy=multi-user.target"
    );

    let path = output_dir.join("moyuren.service");
    fs::write(&path, service_content)?;
    println!("📄 Systemd service file generated: {}", path.display());
    println!("To install:");
    println!("  sudo cp moyuren.service /etc/systemd/system/");
    println!("  sudo systemctl daemon-reload");
    println!("  sudo systemctl enable moyuren");
    println!("  sudo systemctl start moyuren");

    Ok(())
}

pub fn generate_cron_job(output_dir: &Path, binary_name: &str, config_path: &str) -> Result<()> {
    let cron_job = format!(
        "# Moyuren calendar image generation - runs once daily
0 6 * * * /opt/moyuren/{binary_name} generate --config {config_path} >> /var/log/moyuren.log 2>&1

# Clean old cache and images weekly
0 2 * * 0 /opt/moyuren/{binary_name} cleanup --config {config_path} >> /var/log/moyuren.log 2>&1"
    );

    let path = output_dir.join("moyuren.cron");
    fs::write(&path, cron_job)?;
    println!("📄 Cron job generated: {}", path.display());
    println!("To install:");
    println!("  sudo cp moyuren.cron /etc/cron.d/moyuren");
    println!("  sudo chmod 644 /etc/cron.d/moyuren");

    Ok(())
}

pub fn generate_docker_compose(output_dir: &Path, config_path: &str) -> Result<()> {
    let compose_content = format!(
        "version: '3.8'

services:
  moyuren:
    build: .
    container_name: moyuren-daemon
    restart: unless-stopped
    environment:
      - RUST_LOG=info
    volumes:
      - ./cache:/app/cache
      - ./static:/app/static
      - {config_path}:/app/config.yaml:ro
    command: daemon --config /app/config.yaml"
    );

    let path = output_dir.join("docker-compose.yml");
    fs::write(&path, compose_content)?;
    println!("🐳 Docker Compose file generated: {}", path.display());
    println!("To deploy:");
    println!("  docker-compose up -d");
    println!("  docker-compose logs -f moyuren");

    Ok(())
}
