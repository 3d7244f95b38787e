#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use scf_wealth_gap::error::ScfError;
use scf_wealth_gap::scf::ScfClient;

const DOUBLE: u16 = 65526;
const DOUBLE_MISSING: u64 = 0x7fe0_0000_0000_0000;

/// Little-endian release 118 file whose variables are all `double`.
pub fn dta_118(columns: &[(&str, Vec<Option<f64>>)]) -> Vec<u8> {
    let rows = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
    let mut out = Vec::new();
    out.extend_from_slice(b"<stata_dta><header><release>118</release><byteorder>LSF</byteorder><K>");
    out.extend_from_slice(&(columns.len() as u16).to_le_bytes());
    out.extend_from_slice(b"</K><N>");
    out.extend_from_slice(&(rows as u64).to_le_bytes());
    out.extend_from_slice(b"</N><label>");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(b"</label><timestamp>");
    out.push(0);
    out.extend_from_slice(b"</timestamp></header><map>");
    let map_at = out.len();
    out.extend_from_slice(&[0u8; 14 * 8]);
    out.extend_from_slice(b"</map>");

    let mut map = [0u64; 14];
    map[2] = out.len() as u64;
    out.extend_from_slice(b"<variable_types>");
    for _ in columns {
        out.extend_from_slice(&DOUBLE.to_le_bytes());
    }
    out.extend_from_slice(b"</variable_types>");

    map[3] = out.len() as u64;
    out.extend_from_slice(b"<varnames>");
    for (name, _) in columns {
        let mut field = [0u8; 129];
        field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&field);
    }
    out.extend_from_slice(b"</varnames>");

    map[9] = out.len() as u64;
    out.extend_from_slice(b"<data>");
    for row in 0..rows {
        for (_, values) in columns {
            let bits = match values[row] {
                Some(value) => value.to_bits(),
                None => DOUBLE_MISSING,
            };
            out.extend_from_slice(&bits.to_le_bytes());
        }
    }
    out.extend_from_slice(b"</data>");

    map[10] = out.len() as u64;
    out.extend_from_slice(b"<strls></strls></stata_dta>");

    for (i, entry) in map.iter().enumerate() {
        let at = map_at + i * 8;
        out[at..at + 8].copy_from_slice(&entry.to_le_bytes());
    }
    out
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A summary extract for `year`: two white and two black households, one of
/// each with non-positive net worth, plus one household with an unmapped
/// race code.
pub fn summary_year(year: u16) -> Vec<u8> {
    let base = f64::from(year);
    dta_118(&[
        ("yy1", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]),
        ("y1", vec![Some(11.0), Some(21.0), Some(31.0), Some(41.0), Some(51.0)]),
        ("wgt", vec![Some(1.0), Some(3.0), Some(2.0), Some(2.0), Some(1.0)]),
        ("race", vec![Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(6.0)]),
        (
            "networth",
            vec![Some(-base), Some(base), Some(0.0), Some(base), Some(5.0)],
        ),
        ("vehic", vec![Some(0.0), Some(0.0), Some(0.0), Some(base * 2.0), Some(0.0)]),
    ])
}

pub fn summary_archive(year: u16) -> Vec<u8> {
    let name = format!("rscfp{year}.dta");
    let data = summary_year(year);
    zip_bytes(&[
        (name.as_str(), data.as_slice()),
        ("readme.txt", &b"codebook"[..]),
    ])
}

/// Serves canned archives keyed by URL and records every request.
#[derive(Default)]
pub struct MockClient {
    pub archives: HashMap<String, Vec<u8>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn with(mut self, url: String, body: Vec<u8>) -> Self {
        self.archives.insert(url, body);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ScfClient for MockClient {
    fn download(&self, url: &str, destination: &Path) -> Result<(), ScfError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.archives.get(url) {
            Some(body) => {
                fs::write(destination, body).map_err(|err| ScfError::Filesystem(err.to_string()))
            }
            None => Err(ScfError::ScfStatus {
                status: 404,
                message: "Not Found".to_string(),
            }),
        }
    }
}
