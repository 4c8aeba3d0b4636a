use std::path::{Path, PathBuf};
use std::process::Command;
use std::{env, fs};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

const BINARY: &str = "bedrock-healthcheck";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build and install bedrock-healthcheck")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the healthcheck binary
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,

        /// Target triple for cross-compilation (e.g., aarch64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },

    /// Write a systemd unit for the healthcheck
    Service {
        /// Where to write the unit file
        #[arg(long, default_value = "bedrock-healthcheck.service")]
        output: PathBuf,

        /// Path of the installed binary
        #[arg(long, default_value = "/usr/local/bin/bedrock-healthcheck")]
        exec: String,

        /// Optional EnvironmentFile with MINECRAFT_*/PROMETHEUS_* settings
        #[arg(long)]
        env_file: Option<String>,
    },

    /// Package binary for distribution
    Package {
        /// Target triple
        #[arg(long)]
        target: Option<String>,

        /// Output directory
        #[arg(long, default_value = "dist")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { release, target } => {
            build(release, target.as_deref())?;
        }
        Commands::Service {
            output,
            exec,
            env_file,
        } => {
            let unit = generate_systemd_service(&exec, env_file.as_deref());
            fs::write(&output, unit)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("✅ Wrote {}", output.display());
        }
        Commands::Package { target, output } => {
            package(target.as_deref(), &output)?;
        }
    }

    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask must live inside the workspace")
}

fn binary_path(root: &Path, release: bool, target: Option<&str>) -> PathBuf {
    let profile = if release { "release" } else { "debug" };
    match target {
        Some(t) => root.join("target").join(t).join(profile).join(BINARY),
        None => root.join("target").join(profile).join(BINARY),
    }
}

fn build(release: bool, target: Option<&str>) -> Result<PathBuf> {
    let root = project_root()?;

    println!("🔨 Building {}...", BINARY);

    let is_cross_compile = target
        .map(|t| t.contains("linux"))
        .unwrap_or(false) && !cfg!(target_os = "linux");

    let build_cmd = if is_cross_compile {
        if which::which("cross").is_ok() {
            println!("   Using 'cross' for cross-compilation");
            "cross"
        } else {
            bail!(
                "Cross-compilation to Linux requires 'cross' tool.\n\
                 Install with: cargo install cross\n\
                 Also requires Docker to be running."
            );
        }
    } else {
        "cargo"
    };

    let mut cmd = Command::new(build_cmd);
    cmd.current_dir(&root);
    cmd.arg("build");

    if release {
        cmd.arg("--release");
    }

    if let Some(t) = target {
        cmd.arg("--target").arg(t);
        println!("   Target: {}", t);
    }

    cmd.arg("-p").arg(BINARY);

    let status = cmd.status().context("Failed to run cargo build")?;
    if !status.success() {
        bail!("Build failed");
    }

    let binary = binary_path(&root, release, target);
    println!("✅ Build complete: {}", binary.display());
    Ok(binary)
}

fn generate_systemd_service(exec: &str, env_file: Option<&str>) -> String {
    let env_line = env_file
        .map(|f| format!("EnvironmentFile={}\n", f))
        .unwrap_or_default();

    format!(
        r#"[Unit]
Description=Minecraft Server Healthcheck
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
User=minecraft
Group=minecraft
ExecStart={exec}
Restart=on-failure
RestartSec=5
{env_line}
[Install]
WantedBy=multi-user.target
"#
    )
}

fn package(target: Option<&str>, output_dir: &str) -> Result<()> {
    let binary = build(true, target)?;
    if !binary.exists() {
        bail!("Binary not found at: {}", binary.display());
    }

    let root = project_root()?;
    let output_path = root.join(output_dir);
    fs::create_dir_all(&output_path).context("Failed to create output directory")?;

    let arch = target.unwrap_or(env::consts::ARCH);
    let version = env!("CARGO_PKG_VERSION");
    let package_name = format!("{}-{}-{}", BINARY, version, arch);

    let package_dir = output_path.join(&package_name);
    fs::create_dir_all(&package_dir)?;

    fs::copy(&binary, package_dir.join(BINARY))?;

    let env_example = root.join("example.env");
    if env_example.exists() {
        fs::copy(&env_example, package_dir.join("bedrock-healthcheck.env.example"))?;
    }

    let install_script = r#"#!/bin/bash
set -e

INSTALL_DIR="${INSTALL_DIR:-/usr/local/bin}"
CONFIG_DIR="${CONFIG_DIR:-/etc/bedrock-healthcheck}"

echo "Installing bedrock-healthcheck..."

sudo install -m 755 bedrock-healthcheck "$INSTALL_DIR/bedrock-healthcheck"

sudo mkdir -p "$CONFIG_DIR"
if [ -f bedrock-healthcheck.env.example ] && [ ! -f "$CONFIG_DIR/bedrock-healthcheck.env" ]; then
    sudo cp bedrock-healthcheck.env.example "$CONFIG_DIR/bedrock-healthcheck.env"
fi

echo "✅ Installed to $INSTALL_DIR/bedrock-healthcheck"
echo ""
echo "To install as a systemd service, run:"
echo "  sudo ./install-service.sh"
"#;
    fs::write(package_dir.join("install.sh"), install_script)?;

    let service_script = format!(
        r#"#!/bin/bash
set -e

cat > /tmp/bedrock-healthcheck.service << 'EOF'
{}
EOF

sudo mv /tmp/bedrock-healthcheck.service /etc/systemd/system/bedrock-healthcheck.service
sudo systemctl daemon-reload
sudo systemctl enable bedrock-healthcheck

echo "✅ Systemd service installed"
echo "   Start with: sudo systemctl start bedrock-healthcheck"
"#,
        generate_systemd_service(
            "/usr/local/bin/bedrock-healthcheck",
            Some("/etc/bedrock-healthcheck/bedrock-healthcheck.env")
        )
    );
    fs::write(package_dir.join("install-service.sh"), service_script)?;

    let tarball = output_path.join(format!("{}.tar.gz", package_name));
    let tarball_arg = tarball.to_string_lossy().into_owned();
    let status = Command::new("tar")
        .current_dir(&output_path)
        .args(["-czf", tarball_arg.as_str(), package_name.as_str()])
        .status()
        .context("Failed to create tarball")?;
    if !status.success() {
        bail!("Failed to create tarball");
    }

    fs::remove_dir_all(&package_dir)?;

    println!("✅ Package created: {}", tarball.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unit_without_env_file() {
        let unit = generate_systemd_service("/opt/hc/bedrock-healthcheck", None);
        assert!(unit.contains("ExecStart=/opt/hc/bedrock-healthcheck\n"));
        assert!(unit.contains("Restart=on-failure"));
        assert!(unit.contains("After=network-online.target"));
        assert!(unit.contains("User=minecraft"));
        assert!(!unit.contains("EnvironmentFile"));
    }

    #[test]
    fn test_service_unit_with_env_file() {
        let unit = generate_systemd_service("/usr/local/bin/bedrock-healthcheck", Some("/etc/hc.env"));
        assert!(unit.contains("EnvironmentFile=/etc/hc.env\n"));
    }
}
