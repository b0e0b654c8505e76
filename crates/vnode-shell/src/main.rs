//! vnode-shell binary.
//!
//! Assembles a namespace from a TOML config and inspects it.
//!
//! Usage:
//!   vnode-shell --config vnode.toml tree
//!   vnode-shell --config vnode.toml ls /dev
//!   vnode-shell --config vnode.toml cat /boot/etc/motd
//!   vnode-shell mounts
//!
//! Set `RUST_LOG=debug` to watch mounts, redirects and reclamation.

mod namespace;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vnode_kernel::VnodeConfig;
use vnode_kernel::vfs::{Filesystem, NodeKind, StreamRequest, open_path, stat_path};

use namespace::{Namespace, join};

/// Inspect a vnode namespace.
#[derive(Parser, Debug)]
#[command(name = "vnode-shell")]
#[command(about = "Assemble a vnode namespace from config and inspect it")]
struct Args {
    /// Namespace config (TOML); without it only an empty memfs root exists
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tree below PATH, crossing mount points
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file, or one read from a device
    Cat { path: String },
    /// Show node attributes
    Stat { path: String },
    /// List mounted instances
    Mounts,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => VnodeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VnodeConfig::default(),
    };
    let ns = Namespace::build(&config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.command {
        Command::Tree { path } => {
            writeln!(out, "{path}")?;
            tree(&ns, &path, 1, &mut out)?;
        }
        Command::Ls { path } => ls(&ns, &path, &mut out)?,
        Command::Cat { path } => cat(&ns, &path, &mut out)?,
        Command::Stat { path } => {
            let (owner, stat) = stat_path(&ns.root, &path, StreamRequest::any())
                .with_context(|| format!("stat {path}"))?;
            writeln!(out, "  path: {path}")?;
            writeln!(out, "    id: {}", stat.id)?;
            writeln!(out, "  kind: {}", stat.kind)?;
            writeln!(out, "  size: {}", stat.size)?;
            writeln!(out, " items: {}", stat.children)?;
            writeln!(out, "    fs: {} ({})", owner.fs_type(), owner.id())?;
        }
        Command::Mounts => {
            writeln!(out, "/ {} {} rw", ns.root.fs_type(), ns.root.id())?;
            for mount in &ns.mounts {
                let mode = if mount.fs.read_only() { "ro" } else { "rw" };
                writeln!(out, "{} {} {} {mode}", mount.path, mount.fs.fs_type(), mount.fs.id())?;
            }
        }
    }
    Ok(())
}

fn list(ns: &Namespace, path: &str) -> Result<Vec<String>> {
    let (owner, mut dir) = open_path(&ns.root, path, StreamRequest::of(NodeKind::Directory))
        .with_context(|| format!("opening directory {path}"))?;
    let names = owner.read_dir(dir.node, &mut dir.cookie);
    owner.close(dir.node, dir.cookie)?;
    let mut names = names?;
    names.sort();
    Ok(names)
}

fn tree(ns: &Namespace, path: &str, depth: usize, out: &mut impl Write) -> Result<()> {
    for name in list(ns, path)? {
        let child = join(path, &name);
        let (_, stat) = stat_path(&ns.root, &child, StreamRequest::any())?;
        let marker = match stat.kind {
            NodeKind::Directory => "/",
            NodeKind::Device => "@",
            NodeKind::File => "",
        };
        writeln!(out, "{:indent$}{name}{marker}", "", indent = depth * 2)?;
        if stat.is_dir() {
            tree(ns, &child, depth + 1, out)?;
        }
    }
    Ok(())
}

fn ls(ns: &Namespace, path: &str, out: &mut impl Write) -> Result<()> {
    for name in list(ns, path)? {
        let (_, stat) = stat_path(&ns.root, &join(path, &name), StreamRequest::any())?;
        writeln!(out, "{:<9} {:>8} {name}", stat.kind.to_string(), stat.size)?;
    }
    Ok(())
}

fn cat(ns: &Namespace, path: &str, out: &mut impl Write) -> Result<()> {
    let (owner, mut opened) = open_path(&ns.root, path, StreamRequest::any())
        .with_context(|| format!("opening {path}"))?;
    let bytes = read_stream(owner.as_ref(), &mut opened);
    owner.close(opened.node, opened.cookie)?;
    out.write_all(&bytes?)?;
    Ok(())
}

fn read_stream(fs: &dyn Filesystem, opened: &mut vnode_kernel::Opened) -> Result<Vec<u8>> {
    match opened.cookie.kind() {
        NodeKind::File => Ok(fs.read_to_end(opened.node, &mut opened.cookie)?),
        NodeKind::Device => {
            let mut buf = vec![0u8; 4096];
            let n = fs.read(opened.node, &mut opened.cookie, &mut buf)?;
            buf.truncate(n);
            Ok(buf)
        }
        NodeKind::Directory => anyhow::bail!("is a directory"),
    }
}
