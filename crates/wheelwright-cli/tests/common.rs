#![allow(dead_code)]

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use wheelwright_domain::{Record, RecordEntry, WheelFilename};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

pub const LONG_DESCRIPTION: &str = "# sample\n\nA wheel built for command tests.\n";

/// The binary with a scrubbed environment so host tokens never leak in.
pub fn wheelwright() -> Command {
    let mut cmd = cargo_bin_cmd!("wheelwright");
    cmd.env_clear()
        .env("NO_COLOR", "1")
        .env("WHEELWRIGHT_KEEP_PROXIES", "off");
    cmd
}

/// Writes a structurally valid wheel named `filename` into `dir`.
pub fn write_wheel(dir: &Path, filename: &str) -> PathBuf {
    let parsed: WheelFilename = filename.parse().expect("wheel filename");
    let info = parsed.info_dir();
    let metadata = format!(
        "Metadata-Version: 2.1\nName: {}\nVersion: {}\nSummary: sample\n\n{LONG_DESCRIPTION}",
        parsed.distribution, parsed.version
    );
    let members = vec![
        (format!("{}/__init__.py", parsed.distribution), b"VALUE = 1\n".to_vec()),
        (format!("{info}/METADATA"), metadata.into_bytes()),
        (
            format!("{info}/WHEEL"),
            b"Wheel-Version: 1.0\nRoot-Is-Purelib: false\n".to_vec(),
        ),
    ];
    write_members(&dir.join(filename), &members, Some(&format!("{info}/RECORD")))
}

/// Writes `members` as given, plus a matching RECORD when `record` is set.
pub fn write_members(path: &Path, members: &[(String, Vec<u8>)], record: Option<&str>) -> PathBuf {
    let file = File::create(path).expect("create wheel");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = Vec::new();
    for (name, data) in members {
        zip.start_file(name.as_str(), options).expect("start member");
        zip.write_all(data).expect("write member");
        entries.push(RecordEntry::for_contents(name.clone(), data));
    }
    if let Some(record) = record {
        entries.push(RecordEntry::unhashed(record));
        zip.start_file(record, options).expect("start record");
        zip.write_all(Record { entries }.render().as_bytes())
            .expect("write record");
    }
    zip.finish().expect("finish wheel");
    path.to_path_buf()
}

pub fn read_member(wheel: &Path, member: &str) -> String {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(File::open(wheel).expect("open")).expect("zip");
    let mut entry = archive.by_name(member).expect("member");
    let mut text = String::new();
    entry.read_to_string(&mut text).expect("read member");
    text
}

pub fn write_catalog(dir: &Path) -> PathBuf {
    let path = dir.join("build_config.json");
    fs::write(
        &path,
        r#"{
  "project": "vllm",
  "builds": {
    "noavx512": {
      "package_name": "vllm-cpu",
      "description": "Baseline CPU build",
      "platforms": ["x86_64", "aarch64"]
    },
    "avx512": {
      "package_name": "vllm-cpu-avx512",
      "description": "AVX-512 CPU build",
      "platforms": ["x86_64"]
    }
  },
  "platform_tags": {
    "x86_64": "manylinux_2_17_x86_64",
    "aarch64": "manylinux_2_17_aarch64"
  }
}"#,
    )
    .expect("write catalog");
    path
}

pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("json output")
}
