//! Indexer binary provisioning.
//!
//! Resolves the `docfind` executable used by [`crate::indexer`]. An explicit
//! path is trusted as-is; otherwise the release asset matching the host
//! platform is downloaded once, extracted, and kept in a cache directory
//! that later runs reuse without touching the network.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::IndexerConfig;
use crate::process;

const BINARY_NAME: &str = "docfind";

/// Archive formats release assets ship in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn extractor(self) -> Box<dyn Extract> {
        match self {
            ArchiveFormat::TarGz => Box::new(TarGzExtractor),
            ArchiveFormat::Zip => Box::new(ZipExtractor),
        }
    }
}

/// Unpacks an archive into a destination directory.
pub trait Extract {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// `.tar.gz` via the system `tar`.
pub struct TarGzExtractor;

impl Extract for TarGzExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        process::run(
            Command::new("tar")
                .arg("-xzf")
                .arg(archive)
                .arg("-C")
                .arg(dest),
        )
        .with_context(|| format!("Failed to extract {}", archive.display()))?;
        Ok(())
    }
}

/// `.zip` via the `zip` crate.
pub struct ZipExtractor;

impl Extract for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive)
            .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
        let mut zip = zip::ZipArchive::new(file)
            .with_context(|| format!("Not a valid zip archive: {}", archive.display()))?;
        zip.extract(dest)
            .with_context(|| format!("Failed to extract {}", archive.display()))?;
        Ok(())
    }
}

/// A downloadable release asset for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: &'static str,
    pub format: ArchiveFormat,
}

/// Map an `(os, arch)` pair, as reported by `std::env::consts`, to its asset.
pub fn release_asset(os: &str, arch: &str) -> Option<ReleaseAsset> {
    let (name, format) = match (os, arch) {
        ("linux", "x86_64") => ("docfind-x86_64-unknown-linux-musl.tar.gz", ArchiveFormat::TarGz),
        ("linux", "aarch64") => ("docfind-aarch64-unknown-linux-musl.tar.gz", ArchiveFormat::TarGz),
        ("macos", "x86_64") => ("docfind-x86_64-apple-darwin.tar.gz", ArchiveFormat::TarGz),
        ("macos", "aarch64") => ("docfind-aarch64-apple-darwin.tar.gz", ArchiveFormat::TarGz),
        ("windows", "x86_64") => ("docfind-x86_64-pc-windows-msvc.zip", ArchiveFormat::Zip),
        _ => return None,
    };
    Some(ReleaseAsset { name, format })
}

/// Download URL for `asset` at `version` (`latest` or a tag).
pub fn asset_url(release_base_url: &str, version: &str, asset: &ReleaseAsset) -> String {
    let base = release_base_url.trim_end_matches('/');
    if version == "latest" {
        format!("{}/latest/download/{}", base, asset.name)
    } else {
        format!("{}/download/{}/{}", base, version, asset.name)
    }
}

/// Where the extracted binary lives inside the cache.
pub fn cached_binary_path(cache_dir: &Path, version: &str, windows: bool) -> PathBuf {
    let file = if windows {
        format!("{}.exe", BINARY_NAME)
    } else {
        BINARY_NAME.to_string()
    };
    cache_dir.join(version).join(file)
}

/// Return a usable indexer executable, downloading it if needed.
pub fn ensure_binary(
    explicit: Option<&Path>,
    indexer: &IndexerConfig,
    cache_dir: &Path,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "using explicit indexer binary");
        return Ok(path.to_path_buf());
    }

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let Some(asset) = release_asset(os, arch) else {
        bail!("docfind has no release for platform {}/{}", os, arch);
    };

    let windows = os == "windows";
    let target = cached_binary_path(cache_dir, &indexer.version, windows);
    if is_installed(&target) {
        debug!(path = %target.display(), "indexer binary already cached");
        return Ok(target);
    }

    let url = asset_url(&indexer.release_base_url, &indexer.version, &asset);
    info!(%url, "downloading indexer");

    let staging = tempfile::TempDir::new().context("Failed to create download staging dir")?;
    let archive = staging.path().join(asset.name);
    download(&url, &archive)?;

    let extract_dir = staging.path().join("extract");
    std::fs::create_dir_all(&extract_dir)?;
    asset.format.extractor().extract(&archive, &extract_dir)?;

    let found = find_binary(&extract_dir, windows)?.ok_or_else(|| {
        anyhow::anyhow!(
            "No {} binary found in {} after extraction",
            BINARY_NAME,
            asset.name
        )
    })?;

    install(&found, &target)?;
    info!(path = %target.display(), "indexer installed");
    Ok(target)
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("docfind-build/", env!("CARGO_PKG_VERSION")))
        .timeout(None::<Duration>)
        .build()?;
    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("Download {}", url))?;
    if !resp.status().is_success() {
        bail!("Download {} failed with HTTP {}", url, resp.status());
    }
    let mut file =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    resp.copy_to(&mut file)
        .with_context(|| format!("Failed to read body of {}", url))?;
    Ok(())
}

/// Walk an extraction tree for the indexer executable.
///
/// POSIX archives must contain a file named exactly `docfind`; Windows
/// archives are matched by `docfind*.exe`.
pub fn find_binary(root: &Path, windows: bool) -> Result<Option<PathBuf>> {
    let matcher = binary_matcher(windows)?;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

fn binary_matcher(windows: bool) -> Result<GlobMatcher> {
    let pattern = if windows {
        format!("{}*.exe", BINARY_NAME)
    } else {
        BINARY_NAME.to_string()
    };
    Ok(Glob::new(&pattern)?.compile_matcher())
}

/// Copy `found` to `target` through a temporary file in the same directory,
/// so `target` only ever appears complete and executable.
fn install(found: &Path, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .with_context(|| format!("Invalid cache path: {}", target.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;

    let mut source =
        File::open(found).with_context(|| format!("Failed to open {}", found.display()))?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to stage indexer in {}", parent.display()))?;
    io::copy(&mut source, staged.as_file_mut())
        .with_context(|| format!("Failed to copy indexer to {}", target.display()))?;
    staged.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o755))?;
    }

    staged
        .persist(target)
        .with_context(|| format!("Failed to install indexer at {}", target.display()))?;
    Ok(())
}

/// A cached binary counts only if it is a regular file that can be executed.
#[cfg(unix)]
fn is_installed(target: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(target)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_installed(target: &Path) -> bool {
    target.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;
    use tempfile::TempDir;

    fn indexer_config(version: &str, release_base_url: &str) -> IndexerConfig {
        IndexerConfig {
            version: version.to_string(),
            release_base_url: release_base_url.to_string(),
            cache_dir: None,
        }
    }

    /// Answer a single HTTP request with `status` and `body`; returns the base URL.
    fn serve_once(status: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/releases", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            stream.flush().unwrap();
            let request = String::from_utf8_lossy(&request).to_string();
            request.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    /// A `.tar.gz` holding `pkg/docfind`, built with the system `tar`.
    fn release_tarball(dir: &Path, payload: &[u8]) -> Vec<u8> {
        let tree = dir.join("tree");
        std::fs::create_dir_all(tree.join("pkg")).unwrap();
        std::fs::write(tree.join("pkg").join("docfind"), payload).unwrap();
        let archive = dir.join("asset.tar.gz");
        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(&tree)
            .arg("pkg")
            .status()
            .unwrap();
        assert!(status.success());
        std::fs::read(archive).unwrap()
    }

    fn host_ships_tarball() -> bool {
        matches!(
            release_asset(std::env::consts::OS, std::env::consts::ARCH),
            Some(ReleaseAsset {
                format: ArchiveFormat::TarGz,
                ..
            })
        )
    }

    #[test]
    fn lookup_table_covers_supported_platforms() {
        let linux = release_asset("linux", "x86_64").unwrap();
        assert_eq!(linux.format, ArchiveFormat::TarGz);
        assert!(linux.name.contains("linux"));
        let win = release_asset("windows", "x86_64").unwrap();
        assert_eq!(win.format, ArchiveFormat::Zip);
        assert!(release_asset("macos", "aarch64").is_some());
    }

    #[test]
    fn unsupported_platform_has_no_asset() {
        assert!(release_asset("freebsd", "x86_64").is_none());
        assert!(release_asset("windows", "aarch64").is_none());
        assert!(release_asset("linux", "riscv64").is_none());
    }

    #[test]
    fn asset_url_latest_and_tagged() {
        let asset = release_asset("linux", "x86_64").unwrap();
        assert_eq!(
            asset_url("https://example.com/releases/", "latest", &asset),
            "https://example.com/releases/latest/download/docfind-x86_64-unknown-linux-musl.tar.gz"
        );
        assert_eq!(
            asset_url("https://example.com/releases", "v0.3.0", &asset),
            "https://example.com/releases/download/v0.3.0/docfind-x86_64-unknown-linux-musl.tar.gz"
        );
    }

    #[test]
    fn explicit_path_is_returned_unchanged() {
        // The release URL is unroutable: any download attempt would fail.
        let indexer = IndexerConfig {
            version: "latest".to_string(),
            release_base_url: "http://127.0.0.1:9/none".to_string(),
            cache_dir: None,
        };
        let tmp = TempDir::new().unwrap();
        let explicit = Path::new("/opt/tools/docfind-custom");
        let path = ensure_binary(Some(explicit), &indexer, tmp.path()).unwrap();
        assert_eq!(path, explicit);
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[test]
    fn cached_binary_skips_download() {
        if release_asset(std::env::consts::OS, std::env::consts::ARCH).is_none() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let windows = std::env::consts::OS == "windows";
        let cached = cached_binary_path(tmp.path(), "v1", windows);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"bin").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&cached, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let indexer = indexer_config("v1", "http://127.0.0.1:9/none");
        assert_eq!(ensure_binary(None, &indexer, tmp.path()).unwrap(), cached);
        assert_eq!(ensure_binary(None, &indexer, tmp.path()).unwrap(), cached);
    }

    #[test]
    fn find_binary_matches_exact_posix_name() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("docfind-x86_64").join("bin");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("docfind.1"), b"man").unwrap();
        std::fs::write(nested.join("docfind"), b"bin").unwrap();
        let found = find_binary(tmp.path(), false).unwrap().unwrap();
        assert_eq!(found, nested.join("docfind"));
    }

    #[test]
    fn find_binary_matches_windows_exe_prefix() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("README.md"), b"readme").unwrap();
        std::fs::write(tmp.path().join("docfind-x86_64.exe"), b"bin").unwrap();
        let found = find_binary(tmp.path(), true).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "docfind-x86_64.exe");
        assert!(find_binary(tmp.path(), false).unwrap().is_none());
    }

    #[test]
    fn zip_extractor_unpacks_nested_entries() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("asset.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("release/docfind.exe", options).unwrap();
            writer.write_all(b"MZ").unwrap();
            writer.finish().unwrap();
        }
        let dest = tmp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        ArchiveFormat::Zip.extractor().extract(&archive, &dest).unwrap();
        let found = find_binary(&dest, true).unwrap().unwrap();
        assert_eq!(std::fs::read(found).unwrap(), b"MZ");
    }

    #[cfg(unix)]
    #[test]
    fn install_sets_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("docfind");
        std::fs::write(&src, b"bin").unwrap();
        let target = tmp.path().join("cache").join("latest").join("docfind");
        install(&src, &target).unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn install_replaces_stale_file_without_leftovers() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("docfind");
        std::fs::write(&src, b"fresh binary").unwrap();
        let target = tmp.path().join("cache").join("v1").join("docfind");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"trunc").unwrap();

        install(&src, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"fresh binary");
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_cache_entry_is_not_trusted() {
        if release_asset(std::env::consts::OS, std::env::consts::ARCH).is_none() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let cached = cached_binary_path(tmp.path(), "v1", false);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"trunc").unwrap();

        // Not executable, so a fresh download is attempted and fails.
        let indexer = indexer_config("v1", "http://127.0.0.1:9/none");
        assert!(ensure_binary(None, &indexer, tmp.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn http_error_status_is_fatal() {
        if !host_ships_tarball() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let (base, server) = serve_once("404 Not Found", Vec::new());

        let indexer = indexer_config("v1", &base);
        let err = ensure_binary(None, &indexer, tmp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("404"), "unexpected error: {:#}", err);
        assert!(!cached_binary_path(tmp.path(), "v1", false).exists());
        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("GET /releases/download/v1/docfind-"));
    }

    #[cfg(unix)]
    #[test]
    fn download_extracts_and_installs_executable() {
        use std::os::unix::fs::PermissionsExt;
        if !host_ships_tarball() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let tarball = release_tarball(tmp.path(), b"#!/bin/sh\necho docfind\n");
        let (base, server) = serve_once("200 OK", tarball);
        let cache = tmp.path().join("cache");

        let indexer = indexer_config("latest", &base);
        let installed = ensure_binary(None, &indexer, &cache).unwrap();
        assert_eq!(installed, cached_binary_path(&cache, "latest", false));
        assert_eq!(
            std::fs::read(&installed).unwrap(),
            b"#!/bin/sh\necho docfind\n"
        );
        let mode = std::fs::metadata(&installed).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("GET /releases/latest/download/docfind-"));

        // Served once: the second call must come from the cache.
        assert_eq!(ensure_binary(None, &indexer, &cache).unwrap(), installed);
    }
}
