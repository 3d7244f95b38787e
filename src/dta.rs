use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::ScfError;
use polars::prelude::{Column, DataFrame};

use crate::frame::frame_error;

const MAP_ENTRIES: usize = 14;
const MAP_VARIABLE_TYPES: usize = 2;
const MAP_VARNAMES: usize = 3;
const MAP_DATA: usize = 9;
const MAP_STRLS: usize = 10;

const BYTE_MAX: i8 = 100;
const INT_MAX: i16 = 32_740;
const LONG_MAX: i32 = 2_147_483_620;
const FLOAT_MAX_BITS: u32 = 0x7eff_ffff;
const DOUBLE_MAX_BITS: u64 = 0x7fdf_ffff_ffff_ffff;

enum Values {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarType {
    Str(usize),
    StrL,
    Double,
    Float,
    Long,
    Int,
    Byte,
}

impl VarType {
    fn from_tagged(code: u16) -> Result<Self, ScfError> {
        match code {
            1..=2045 => Ok(VarType::Str(code as usize)),
            32768 => Ok(VarType::StrL),
            65526 => Ok(VarType::Double),
            65527 => Ok(VarType::Float),
            65528 => Ok(VarType::Long),
            65529 => Ok(VarType::Int),
            65530 => Ok(VarType::Byte),
            other => Err(ScfError::DtaParse(format!("unknown variable type {other}"))),
        }
    }

    fn from_legacy(code: u8) -> Result<Self, ScfError> {
        match code {
            1..=244 => Ok(VarType::Str(code as usize)),
            251 => Ok(VarType::Byte),
            252 => Ok(VarType::Int),
            253 => Ok(VarType::Long),
            254 => Ok(VarType::Float),
            255 => Ok(VarType::Double),
            other => Err(ScfError::DtaParse(format!("unknown variable type {other}"))),
        }
    }

    fn is_text(self) -> bool {
        matches!(self, VarType::Str(_) | VarType::StrL)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            order: ByteOrder::Little,
        }
    }

    fn seek(&mut self, pos: u64) -> Result<(), ScfError> {
        let pos = usize::try_from(pos)
            .ok()
            .filter(|pos| *pos <= self.buf.len())
            .ok_or_else(|| ScfError::DtaParse(format!("offset {pos} beyond end of file")))?;
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ScfError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| ScfError::DtaParse("unexpected end of file".to_string()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ScfError> {
        self.take(len).map(|_| ())
    }

    fn peek_tag(&self, tag: &str) -> bool {
        self.buf[self.pos..].starts_with(tag.as_bytes())
    }

    fn expect_tag(&mut self, tag: &str) -> Result<(), ScfError> {
        if !self.peek_tag(tag) {
            return Err(ScfError::DtaParse(format!(
                "expected {tag} at offset {}",
                self.pos
            )));
        }
        self.pos += tag.len();
        Ok(())
    }

    fn uint(&mut self, width: usize) -> Result<u64, ScfError> {
        let bytes = self.take(width)?;
        let value = match self.order {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
            ByteOrder::Big => bytes
                .iter()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
        };
        Ok(value)
    }

    fn u8(&mut self) -> Result<u8, ScfError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ScfError> {
        Ok(self.uint(2)? as u16)
    }

    fn u32(&mut self) -> Result<u32, ScfError> {
        Ok(self.uint(4)? as u32)
    }

    fn u64(&mut self) -> Result<u64, ScfError> {
        self.uint(8)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ScfError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        if self.order == ByteOrder::Big {
            out.reverse();
        }
        Ok(out)
    }

    fn numeric(&mut self, var_type: VarType) -> Result<Option<f64>, ScfError> {
        let value = match var_type {
            VarType::Byte => {
                let value = self.u8()? as i8;
                (value <= BYTE_MAX).then_some(f64::from(value))
            }
            VarType::Int => {
                let value = i16::from_le_bytes(self.array::<2>()?);
                (value <= INT_MAX).then_some(f64::from(value))
            }
            VarType::Long => {
                let value = i32::from_le_bytes(self.array::<4>()?);
                (value <= LONG_MAX).then_some(f64::from(value))
            }
            VarType::Float => {
                let value = f32::from_le_bytes(self.array::<4>()?);
                let missing = value.is_nan() || value > f32::from_bits(FLOAT_MAX_BITS);
                (!missing).then_some(f64::from(value))
            }
            VarType::Double => {
                let value = f64::from_le_bytes(self.array::<8>()?);
                let missing = value.is_nan() || value > f64::from_bits(DOUBLE_MAX_BITS);
                (!missing).then_some(value)
            }
            VarType::Str(_) | VarType::StrL => {
                return Err(ScfError::DtaParse("text read as number".to_string()));
            }
        };
        Ok(value)
    }
}

type StrlKey = (u64, u64);

#[derive(Debug, Clone, Copy)]
struct Layout {
    release: u16,
    name_len: usize,
    utf8: bool,
}

impl Layout {
    fn strl_pointer(&self, cursor: &mut Cursor<'_>) -> Result<StrlKey, ScfError> {
        match self.release {
            117 => Ok((u64::from(cursor.u32()?), u64::from(cursor.u32()?))),
            118 => {
                let v = cursor.uint(2)?;
                let o = cursor.uint(6)?;
                Ok((v, o))
            }
            _ => {
                let v = cursor.uint(3)?;
                let o = cursor.uint(5)?;
                Ok((v, o))
            }
        }
    }
}

pub fn read_dta(path: &Path) -> Result<DataFrame, ScfError> {
    let bytes = fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ScfError::DataFileNotFound(path.to_path_buf())
        } else {
            ScfError::Filesystem(format!("read {}: {err}", path.display()))
        }
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "reading stata file");
    parse_dta(&bytes)
}

pub fn parse_dta(bytes: &[u8]) -> Result<DataFrame, ScfError> {
    if bytes.starts_with(b"<stata_dta>") {
        parse_tagged(bytes)
    } else {
        parse_legacy(bytes)
    }
}

fn parse_tagged(bytes: &[u8]) -> Result<DataFrame, ScfError> {
    let mut cursor = Cursor::new(bytes);
    cursor.expect_tag("<stata_dta>")?;
    cursor.expect_tag("<header>")?;
    cursor.expect_tag("<release>")?;
    let release_text = String::from_utf8_lossy(cursor.take(3)?).to_string();
    let release = release_text
        .parse::<u16>()
        .map_err(|_| ScfError::UnsupportedDtaRelease(release_text.clone()))?;
    if !(117..=119).contains(&release) {
        return Err(ScfError::UnsupportedDtaRelease(release_text));
    }
    cursor.expect_tag("</release>")?;

    cursor.expect_tag("<byteorder>")?;
    cursor.order = match cursor.take(3)? {
        b"MSF" => ByteOrder::Big,
        b"LSF" => ByteOrder::Little,
        other => {
            return Err(ScfError::DtaParse(format!(
                "unknown byte order {}",
                String::from_utf8_lossy(other)
            )));
        }
    };
    cursor.expect_tag("</byteorder>")?;

    cursor.expect_tag("<K>")?;
    let nvar = if release == 119 {
        cursor.u32()? as usize
    } else {
        cursor.u16()? as usize
    };
    cursor.expect_tag("</K>")?;

    cursor.expect_tag("<N>")?;
    let nobs = if release == 117 {
        u64::from(cursor.u32()?)
    } else {
        cursor.u64()?
    };
    let nobs = usize::try_from(nobs)
        .map_err(|_| ScfError::DtaParse(format!("observation count {nobs} too large")))?;
    cursor.expect_tag("</N>")?;

    cursor.expect_tag("<label>")?;
    let label_len = if release == 117 {
        cursor.u8()? as usize
    } else {
        cursor.u16()? as usize
    };
    cursor.skip(label_len)?;
    cursor.expect_tag("</label>")?;
    cursor.expect_tag("<timestamp>")?;
    let stamp_len = cursor.u8()? as usize;
    cursor.skip(stamp_len)?;
    cursor.expect_tag("</timestamp>")?;
    cursor.expect_tag("</header>")?;

    cursor.expect_tag("<map>")?;
    let mut map = [0u64; MAP_ENTRIES];
    for entry in map.iter_mut() {
        *entry = cursor.u64()?;
    }
    cursor.expect_tag("</map>")?;

    let layout = Layout {
        release,
        name_len: if release == 117 { 33 } else { 129 },
        utf8: release >= 118,
    };
    debug!(release, nvar, nobs, "stata header");

    cursor.seek(map[MAP_VARIABLE_TYPES])?;
    cursor.expect_tag("<variable_types>")?;
    let types = (0..nvar)
        .map(|_| cursor.u16().and_then(VarType::from_tagged))
        .collect::<Result<Vec<_>, _>>()?;

    cursor.seek(map[MAP_VARNAMES])?;
    cursor.expect_tag("<varnames>")?;
    let names = read_names(&mut cursor, nvar, layout.name_len, layout.utf8)?;

    let strls = if types.contains(&VarType::StrL) {
        cursor.seek(map[MAP_STRLS])?;
        read_strls(&mut cursor, layout)?
    } else {
        HashMap::new()
    };

    cursor.seek(map[MAP_DATA])?;
    cursor.expect_tag("<data>")?;
    read_data(&mut cursor, &names, &types, nobs, layout, &strls)
}

fn parse_legacy(bytes: &[u8]) -> Result<DataFrame, ScfError> {
    let mut cursor = Cursor::new(bytes);
    let release = u16::from(cursor.u8()?);
    if !(113..=115).contains(&release) {
        return Err(ScfError::UnsupportedDtaRelease(release.to_string()));
    }
    cursor.order = match cursor.u8()? {
        1 => ByteOrder::Big,
        2 => ByteOrder::Little,
        other => {
            return Err(ScfError::DtaParse(format!("unknown byte order {other}")));
        }
    };
    cursor.skip(2)?;
    let nvar = cursor.u16()? as usize;
    let nobs = cursor.u32()? as usize;
    cursor.skip(81 + 18)?;

    let types = cursor
        .take(nvar)?
        .iter()
        .map(|code| VarType::from_legacy(*code))
        .collect::<Result<Vec<_>, _>>()?;
    let names = read_names(&mut cursor, nvar, 33, false)?;
    let format_len = if release == 113 { 12 } else { 49 };
    // sort list, formats, value label names, variable labels
    cursor.skip(2 * (nvar + 1) + nvar * format_len + nvar * 33 + nvar * 81)?;

    loop {
        let kind = cursor.u8()?;
        let len = cursor.u32()? as usize;
        if kind == 0 && len == 0 {
            break;
        }
        cursor.skip(len)?;
    }
    debug!(release, nvar, nobs, "legacy stata header");

    let layout = Layout {
        release,
        name_len: 33,
        utf8: false,
    };
    read_data(&mut cursor, &names, &types, nobs, layout, &HashMap::new())
}

fn read_names(
    cursor: &mut Cursor<'_>,
    nvar: usize,
    width: usize,
    utf8: bool,
) -> Result<Vec<String>, ScfError> {
    (0..nvar)
        .map(|_| cursor.take(width).map(|raw| decode_fixed(raw, utf8)))
        .collect()
}

fn read_strls(
    cursor: &mut Cursor<'_>,
    layout: Layout,
) -> Result<HashMap<StrlKey, String>, ScfError> {
    cursor.expect_tag("<strls>")?;
    let mut out = HashMap::new();
    while cursor.peek_tag("GSO") {
        cursor.skip(3)?;
        let v = u64::from(cursor.u32()?);
        let o = if layout.release == 117 {
            u64::from(cursor.u32()?)
        } else {
            cursor.u64()?
        };
        let kind = cursor.u8()?;
        let len = cursor.u32()? as usize;
        let raw = cursor.take(len)?;
        let value = match kind {
            // ascii payloads carry a trailing NUL
            130 => decode_fixed(raw, layout.utf8),
            129 => String::from_utf8_lossy(raw).to_string(),
            other => {
                return Err(ScfError::DtaParse(format!("unknown strL type {other}")));
            }
        };
        out.insert((v, o), value);
    }
    cursor.expect_tag("</strls>")?;
    Ok(out)
}

fn read_data(
    cursor: &mut Cursor<'_>,
    names: &[String],
    types: &[VarType],
    nobs: usize,
    layout: Layout,
    strls: &HashMap<StrlKey, String>,
) -> Result<DataFrame, ScfError> {
    let mut columns: Vec<Values> = types
        .iter()
        .map(|var_type| {
            if var_type.is_text() {
                Values::Text(Vec::with_capacity(nobs))
            } else {
                Values::Numeric(Vec::with_capacity(nobs))
            }
        })
        .collect();

    for _ in 0..nobs {
        for (var_type, column) in types.iter().zip(columns.iter_mut()) {
            match (var_type, column) {
                (VarType::Str(width), Values::Text(values)) => {
                    let raw = cursor.take(*width)?;
                    values.push(Some(decode_fixed(raw, layout.utf8)));
                }
                (VarType::StrL, Values::Text(values)) => {
                    let key = layout.strl_pointer(cursor)?;
                    let value = if key == (0, 0) {
                        String::new()
                    } else {
                        strls.get(&key).cloned().ok_or_else(|| {
                            ScfError::DtaParse(format!("dangling strL ({}, {})", key.0, key.1))
                        })?
                    };
                    values.push(Some(value));
                }
                (numeric_type, Values::Numeric(values)) => {
                    values.push(cursor.numeric(*numeric_type)?);
                }
                _ => {
                    return Err(ScfError::DtaParse("column type mismatch".to_string()));
                }
            }
        }
    }

    let columns = names
        .iter()
        .zip(columns)
        .map(|(name, values)| match values {
            Values::Numeric(values) => Column::new(name.as_str().into(), values),
            Values::Text(values) => Column::new(name.as_str().into(), values),
        })
        .collect();
    DataFrame::new(columns).map_err(frame_error)
}

/// Decodes a NUL-padded fixed-width field. Releases before 118 are Latin-1.
fn decode_fixed(raw: &[u8], utf8: bool) -> String {
    let end = raw.iter().position(|byte| *byte == 0).unwrap_or(raw.len());
    let raw = &raw[..end];
    if utf8 {
        String::from_utf8_lossy(raw).to_string()
    } else {
        raw.iter().map(|byte| char::from(*byte)).collect()
    }
}
