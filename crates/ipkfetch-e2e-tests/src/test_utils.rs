use eyre::Result;
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Feed directory below the mock server root.
pub const FEED_PATH: &str = "/feed/cortexa9-vfpv3";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("ipkfetch_lib=debug,ipkfetch_e2e_tests=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Extraction shells out to binutils `ar`; scenarios that unpack need it installed.
pub fn require_ar() {
    let available = std::process::Command::new("ar")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    assert!(
        available,
        "binutils `ar` must be on PATH to run extraction scenarios"
    );
}

pub fn tar_gz(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents)?;
    }
    Ok(builder.into_inner()?.finish()?)
}

/// GNU-style `ar` archive with the given members.
pub fn ar_archive(members: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut out = b"!<arch>\n".to_vec();
    for (name, contents) in members {
        write!(
            out,
            "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
            format!("{name}/"),
            0,
            0,
            0,
            "100644",
            contents.len()
        )?;
        out.extend_from_slice(contents);
        if contents.len() % 2 == 1 {
            out.push(b'\n');
        }
    }
    Ok(out)
}

/// An `ipk` artifact whose `data.tar.gz` holds `files`.
pub fn ipk(package: &str, files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let control_file = format!("Package: {package}\nVersion: 1.0-r0\n");
    let control = tar_gz(&[("./control", control_file.as_bytes())])?;
    let data = tar_gz(files)?;
    ar_archive(&[
        ("debian-binary", b"2.0\n"),
        ("control.tar.gz", &control),
        ("data.tar.gz", &data),
    ])
}

/// One `Packages` block for `package` stored at `filename`.
pub fn index_entry(package: &str, filename: &str) -> String {
    format!(
        "Package: {package}\n\
         Version: 1.0-r0\n\
         Depends: libc6 (>= 2.35)\n\
         Architecture: cortexa9-vfpv3\n\
         Filename: {filename}\n\
         Size: 1024\n\
         Priority: optional\n\
         \n"
    )
}

/// A package feed served by a wiremock server.
pub struct MockFeed {
    pub server: MockServer,
}

impl MockFeed {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn repository_url(&self) -> String {
        format!("{}{}", self.server.uri(), FEED_PATH)
    }

    pub async fn serve(&self, rel: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("{FEED_PATH}/{rel}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    pub async fn serve_index(&self, entries: &[String]) {
        self.serve("Packages", entries.concat().into_bytes()).await;
    }

    pub async fn serve_status(&self, rel: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("{FEED_PATH}/{rel}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}

/// Writes `config.json` into `dir` and returns its path.
pub fn write_config(dir: &Path, config: &Value) -> Result<PathBuf> {
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(config)?)?;
    Ok(config_path)
}

/// Config for `feed` with the given build and deploy sets. Extraction runs
/// without a settle delay to keep tests fast.
pub fn feed_config(feed: &MockFeed, build: Value, deploy: Value) -> Value {
    json!({
        "repository": feed.repository_url(),
        "download": {
            "parallelism": 2,
        },
        "extract": {
            "settle_delay_ms": 0,
        },
        "build": build,
        "deploy": deploy,
    })
}
