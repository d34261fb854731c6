//! A GRIB edition 1 decoder.
//!
//! Decodes fields on regular latitude/longitude grids with simple packing and an optional bitmap,
//! and assembles the fields into a [`Dataset`] with one data variable per parameter.
//!
//! Dimensions are ordered `number`, `time`, `step`, level, `latitude`, `longitude`.
//! A dimension with a single value becomes a scalar coordinate, except for `time`, `latitude` and `longitude`.
//! Points masked by a bitmap and combinations without a field are NaN.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};

use ndarray::{Array1, ArrayD, Axis, IxDyn};
use serde_json::Value;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError, Variable, VariableData};

const NANOSECONDS_PER_SECOND: i64 = 1_000_000_000;

/// The ECMWF centre identifier.
const ECMWF: u8 = 98;

/// A GRIB decoding error.
#[derive(Clone, Debug, Error)]
pub enum DecodeError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// The input holds no GRIB messages.
    #[error("no GRIB messages found")]
    NoMessages,
    /// A message is not GRIB edition 1.
    #[error("message at byte {offset} is GRIB edition {edition}, only edition 1 is supported")]
    UnsupportedEdition {
        /// The byte offset of the message.
        offset: usize,
        /// The edition.
        edition: u8,
    },
    /// A message is shorter than its sections declare.
    #[error("message at byte {0} is truncated")]
    Truncated(usize),
    /// A message is malformed or uses an unsupported feature.
    #[error("message at byte {offset}: {reason}")]
    Malformed {
        /// The byte offset of the message.
        offset: usize,
        /// What is wrong with the message.
        reason: String,
    },
    /// The messages cannot be assembled into a dataset.
    #[error("inconsistent messages: {0}")]
    Inconsistent(String),
    /// A dataset error.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

/// Decode the GRIB edition 1 file at `path` into a [`Dataset`].
///
/// # Errors
/// Returns a [`DecodeError`] if the file cannot be read or holds malformed or inconsistent messages.
pub fn decode(path: &Path) -> Result<Dataset, DecodeError> {
    let bytes = std::fs::read(path)?;
    let dataset = decode_bytes(&bytes)?;
    log::debug!("decoded {} into {dataset}", path.display());
    Ok(dataset)
}

/// Decode GRIB edition 1 messages into a [`Dataset`].
///
/// # Errors
/// Returns a [`DecodeError`] if `bytes` holds malformed or inconsistent messages.
pub fn decode_bytes(bytes: &[u8]) -> Result<Dataset, DecodeError> {
    let mut fields = Vec::new();
    let mut offset = 0;
    while let Some(start) = find_message(bytes, offset) {
        let (field, length) = decode_message(bytes, start)?;
        fields.push(field);
        offset = start + length;
    }
    if fields.is_empty() {
        return Err(DecodeError::NoMessages);
    }
    log::trace!("decoded {} GRIB messages", fields.len());
    assemble(fields)
}

fn find_message(bytes: &[u8], offset: usize) -> Option<usize> {
    bytes
        .get(offset..)?
        .windows(4)
        .position(|window| window == b"GRIB")
        .map(|position| offset + position)
}

/// A section of a message, addressed by the 1-based octet numbers of the GRIB tables.
#[derive(Clone, Copy)]
struct Section<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Section<'a> {
    /// Split the section starting at `start` of `message` from its 3 octet length.
    fn read(message: &'a [u8], start: usize, offset: usize) -> Result<Self, DecodeError> {
        let header = message
            .get(start..start + 3)
            .ok_or(DecodeError::Truncated(offset))?;
        let length =
            (usize::from(header[0]) << 16) | (usize::from(header[1]) << 8) | usize::from(header[2]);
        let bytes = message
            .get(start..start + length)
            .ok_or(DecodeError::Truncated(offset))?;
        Ok(Self { bytes, offset })
    }

    fn octet(&self, octet: usize) -> Result<u8, DecodeError> {
        self.bytes
            .get(octet - 1)
            .copied()
            .ok_or(DecodeError::Truncated(self.offset))
    }

    fn octets(&self, first: usize, last: usize) -> Result<&'a [u8], DecodeError> {
        self.bytes
            .get(first - 1..last)
            .ok_or(DecodeError::Truncated(self.offset))
    }

    fn unsigned(&self, first: usize, last: usize) -> Result<u64, DecodeError> {
        Ok(self
            .octets(first, last)?
            .iter()
            .fold(0, |value, &byte| value << 8 | u64::from(byte)))
    }

    /// A sign and magnitude integer: the first bit is the sign.
    #[allow(clippy::cast_possible_wrap)]
    fn signed(&self, first: usize, last: usize) -> Result<i64, DecodeError> {
        let value = self.unsigned(first, last)?;
        let sign_bit = 1 << (8 * (last - first + 1) - 1);
        let magnitude = (value & !sign_bit) as i64;
        Ok(if value & sign_bit == 0 {
            magnitude
        } else {
            -magnitude
        })
    }

    fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Malformed {
            offset: self.offset,
            reason: reason.into(),
        }
    }
}

/// An IBM single precision float: sign bit, 7 bit base 16 exponent with a bias of 64 and a 24 bit mantissa.
fn ibm_float(bytes: &[u8]) -> f64 {
    let sign = if bytes[0] & 0x80 == 0 { 1.0 } else { -1.0 };
    let exponent = i32::from(bytes[0] & 0x7f) - 64;
    let mantissa = (u32::from(bytes[1]) << 16) | (u32::from(bytes[2]) << 8) | u32::from(bytes[3]);
    sign * f64::from(mantissa) * 2f64.powi(-24) * 16f64.powi(exponent)
}

fn read_bits(data: &[u8], bit_offset: usize, num_bits: usize) -> u64 {
    (bit_offset..bit_offset + num_bits).fold(0, |value, bit| {
        value << 1 | u64::from((data[bit / 8] >> (7 - bit % 8)) & 1)
    })
}

/// A regular latitude/longitude grid.
#[derive(Clone, Debug, PartialEq)]
struct Grid {
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    /// Points are ordered with latitude varying fastest.
    latitude_fastest: bool,
}

impl Grid {
    fn from_gds(gds: Section<'_>) -> Result<Self, DecodeError> {
        let data_representation = gds.octet(6)?;
        if data_representation != 0 {
            return Err(gds.malformed(format!(
                "grid type {data_representation} is not supported, only regular latitude/longitude grids are"
            )));
        }
        let ni = usize::try_from(gds.unsigned(7, 8)?).map_err(|_| gds.malformed("too many points"))?;
        let nj = usize::try_from(gds.unsigned(9, 10)?).map_err(|_| gds.malformed("too many points"))?;
        let la1 = gds.signed(11, 13)?;
        let lo1 = gds.signed(14, 16)?;
        let la2 = gds.signed(18, 20)?;
        let mut lo2 = gds.signed(21, 23)?;
        if ni == 0 || nj == 0 {
            return Err(gds.malformed(format!("grid of {ni} by {nj} points is empty")));
        }
        let scanning_mode = gds.octet(28)?;
        if scanning_mode & 0x80 == 0 && lo2 < lo1 {
            lo2 += 360_000;
        }
        Ok(Self {
            latitudes: axis_values(la1, la2, nj),
            longitudes: axis_values(lo1, lo2, ni),
            latitude_fastest: scanning_mode & 0x20 != 0,
        })
    }

    fn num_points(&self) -> usize {
        self.latitudes.len() * self.longitudes.len()
    }

    /// Reorder `values` so that longitude varies fastest.
    fn to_row_major(&self, values: Vec<f64>) -> Vec<f64> {
        if !self.latitude_fastest {
            return values;
        }
        let (ni, nj) = (self.longitudes.len(), self.latitudes.len());
        (0..nj)
            .flat_map(|j| (0..ni).map(move |i| (i, j)))
            .map(|(i, j)| values[i * nj + j])
            .collect()
    }
}

/// `count` evenly spaced values from `first` to `last` millidegrees, in degrees.
#[allow(clippy::cast_precision_loss)]
fn axis_values(first: i64, last: i64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return std::iter::repeat_n(first as f64 / 1000.0, count).collect();
    }
    let step = (last - first) as f64 / (count - 1) as f64;
    (0..count)
        .map(|index| (first as f64 + index as f64 * step) / 1000.0)
        .collect()
}

/// A decoded field: one message.
#[derive(Clone, Debug)]
struct Field {
    table: u8,
    parameter: u8,
    centre: u8,
    level_type: u8,
    level: u16,
    number: Option<i64>,
    time: i64,
    step: i64,
    grid: Grid,
    values: Vec<f64>,
}

/// Decode the message starting at `offset`, returning the field and the message length.
fn decode_message(bytes: &[u8], offset: usize) -> Result<(Field, usize), DecodeError> {
    let indicator = bytes
        .get(offset..offset + 8)
        .ok_or(DecodeError::Truncated(offset))?;
    let edition = indicator[7];
    if edition != 1 {
        return Err(DecodeError::UnsupportedEdition { offset, edition });
    }
    let length = (usize::from(indicator[4]) << 16)
        | (usize::from(indicator[5]) << 8)
        | usize::from(indicator[6]);
    let message = bytes
        .get(offset..offset + length)
        .ok_or(DecodeError::Truncated(offset))?;
    if !message.ends_with(b"7777") {
        return Err(DecodeError::Malformed {
            offset,
            reason: "missing end section".to_string(),
        });
    }

    let pds = Section::read(message, 8, offset)?;
    let mut position = 8 + pds.bytes.len();
    let flag = pds.octet(8)?;
    if flag & 0x80 == 0 {
        return Err(pds.malformed("predefined grids are not supported"));
    }
    let gds = Section::read(message, position, offset)?;
    position += gds.bytes.len();
    let bms = if flag & 0x40 == 0 {
        None
    } else {
        let bms = Section::read(message, position, offset)?;
        position += bms.bytes.len();
        Some(bms)
    };
    let bds = Section::read(message, position, offset)?;

    let grid = Grid::from_gds(gds)?;
    let num_points = grid.num_points();
    let bitmap = match bms {
        Some(bms) => {
            if bms.unsigned(5, 6)? != 0 {
                return Err(bms.malformed("predefined bitmaps are not supported"));
            }
            let bitmap = bms.bytes.get(6..).unwrap_or_default();
            if bitmap.len() * 8 < num_points {
                return Err(DecodeError::Truncated(offset));
            }
            Some((0..num_points).map(|point| read_bits(bitmap, point, 1) == 1).collect::<Vec<_>>())
        }
        None => None,
    };
    let num_packed = bitmap
        .as_ref()
        .map_or(num_points, |bitmap| bitmap.iter().filter(|&&present| present).count());
    let packed = unpack_simple(bds, pds, num_packed)?;
    let values = match bitmap {
        Some(bitmap) => {
            let mut packed = packed.into_iter();
            bitmap
                .into_iter()
                .map(|present| if present { packed.next().unwrap_or(f64::NAN) } else { f64::NAN })
                .collect()
        }
        None => packed,
    };

    let centre = pds.octet(5)?;
    // the MARS labelling local definition carries the ensemble member number
    let number = (centre == ECMWF && pds.bytes.len() >= 50 && pds.octet(41)? == 1)
        .then(|| pds.octet(50).map(i64::from))
        .transpose()?;
    let field = Field {
        table: pds.octet(4)?,
        parameter: pds.octet(9)?,
        centre,
        level_type: pds.octet(10)?,
        level: u16::try_from(pds.unsigned(11, 12)?).unwrap_or(u16::MAX),
        number,
        time: reference_time(pds)?,
        step: forecast_step(pds)?,
        values: grid.to_row_major(values),
        grid,
    };
    Ok((field, length))
}

/// Unpack `num_values` simple packed values: `Y = (R + X * 2^E) / 10^D`.
fn unpack_simple(bds: Section<'_>, pds: Section<'_>, num_values: usize) -> Result<Vec<f64>, DecodeError> {
    let flag = bds.octet(4)?;
    if flag & 0xf0 != 0 {
        return Err(bds.malformed(format!(
            "binary data flag {flag:#x} is not supported, only simple packing of grid point data is"
        )));
    }
    let binary_scale = i32::try_from(bds.signed(5, 6)?).map_err(|_| bds.malformed("binary scale"))?;
    let decimal_scale = i32::try_from(pds.signed(27, 28)?).map_err(|_| pds.malformed("decimal scale"))?;
    let reference = ibm_float(bds.octets(7, 10)?);
    let num_bits = usize::from(bds.octet(11)?);
    if num_bits > 64 {
        return Err(bds.malformed(format!("{num_bits} bits per value")));
    }
    let data = bds.bytes.get(11..).unwrap_or_default();
    if data.len() * 8 < num_values * num_bits {
        return Err(DecodeError::Truncated(bds.offset));
    }
    let binary = 2f64.powi(binary_scale);
    let decimal = 10f64.powi(-decimal_scale);
    #[allow(clippy::cast_precision_loss)]
    let values = (0..num_values)
        .map(|index| {
            let packed = read_bits(data, index * num_bits, num_bits);
            (reference + packed as f64 * binary) * decimal
        })
        .collect();
    Ok(values)
}

/// The reference time in nanoseconds since the Unix epoch.
fn reference_time(pds: Section<'_>) -> Result<i64, DecodeError> {
    let century = i32::from(pds.octet(25)?);
    let year = (century - 1) * 100 + i32::from(pds.octet(13)?);
    let (hour, minute) = (u32::from(pds.octet(16)?), u32::from(pds.octet(17)?));
    let date = chrono::NaiveDate::from_ymd_opt(
        year,
        u32::from(pds.octet(14)?),
        u32::from(pds.octet(15)?),
    )
    .and_then(|date| date.and_hms_opt(hour, minute, 0))
    .ok_or_else(|| pds.malformed("invalid reference time"))?;
    date.and_utc()
        .timestamp_nanos_opt()
        .ok_or_else(|| pds.malformed("reference time out of range"))
}

/// The forecast step in nanoseconds.
fn forecast_step(pds: Section<'_>) -> Result<i64, DecodeError> {
    let unit_seconds = match pds.octet(18)? {
        0 => 60,
        1 => 3_600,
        2 => 86_400,
        10 => 3 * 3_600,
        11 => 6 * 3_600,
        12 => 12 * 3_600,
        13 => 15 * 60,
        14 => 30 * 60,
        254 => 1,
        unit => return Err(pds.malformed(format!("time unit {unit} is not supported"))),
    };
    let (p1, p2) = (i64::from(pds.octet(19)?), i64::from(pds.octet(20)?));
    let steps = match pds.octet(21)? {
        0 => p1,
        1 => 0,
        2..=5 => p2,
        10 => (p1 << 8) | p2,
        indicator => {
            return Err(pds.malformed(format!("time range indicator {indicator} is not supported")))
        }
    };
    Ok(steps * unit_seconds * NANOSECONDS_PER_SECOND)
}

/// The parameter id, short name, units and long name of a parameter of a code table.
fn parameter(table: u8, parameter: u8) -> (u32, String, &'static str, &'static str) {
    let param_id = if table == 128 {
        u32::from(parameter)
    } else {
        u32::from(table) * 1000 + u32::from(parameter)
    };
    let known = match param_id {
        129 => Some(("z", "m**2 s**-2", "Geopotential")),
        130 => Some(("t", "K", "Temperature")),
        131 => Some(("u", "m s**-1", "U component of wind")),
        132 => Some(("v", "m s**-1", "V component of wind")),
        133 => Some(("q", "kg kg**-1", "Specific humidity")),
        151 => Some(("msl", "Pa", "Mean sea level pressure")),
        157 => Some(("r", "%", "Relative humidity")),
        167 => Some(("2t", "K", "2 metre temperature")),
        _ => None,
    };
    match known {
        Some((short_name, units, long_name)) => (param_id, short_name.to_string(), units, long_name),
        None => (param_id, format!("p{param_id}"), "unknown", "unknown"),
    }
}

fn level_name(level_type: u8) -> &'static str {
    match level_type {
        1 => "surface",
        100 => "isobaricInhPa",
        105 => "heightAboveGround",
        109 => "hybrid",
        _ => "level",
    }
}

fn attributes<const N: usize>(attributes: [(&str, Value); N]) -> serde_json::Map<String, Value> {
    attributes
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Sorted distinct values of a field property.
fn distinct<T: Ord + Copy>(fields: &[Field], property: impl Fn(&Field) -> T) -> Vec<T> {
    fields
        .iter()
        .map(property)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn position<T: PartialEq>(values: &[T], value: &T) -> usize {
    values.iter().position(|v| v == value).unwrap_or_default()
}

/// A coordinate, a dimension if it has more than one value and is not forced scalar.
struct Coordinate {
    name: &'static str,
    data: VariableData,
    attrs: serde_json::Map<String, Value>,
    len: usize,
}

fn one_dimensional<T>(values: Vec<T>) -> ArrayD<T> {
    Array1::from(values).into_dyn()
}

/// The single value of 1-D `data` as 0-D data.
fn scalar(data: &VariableData) -> VariableData {
    match data {
        VariableData::Float32(a) => VariableData::Float32(a.index_axis(Axis(0), 0).to_owned()),
        VariableData::Float64(a) => VariableData::Float64(a.index_axis(Axis(0), 0).to_owned()),
        VariableData::Int64(a) => VariableData::Int64(a.index_axis(Axis(0), 0).to_owned()),
        VariableData::DateTime64(a) => VariableData::DateTime64(a.index_axis(Axis(0), 0).to_owned()),
        VariableData::TimeDelta64(a) => VariableData::TimeDelta64(a.index_axis(Axis(0), 0).to_owned()),
    }
}

#[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
fn assemble(fields: Vec<Field>) -> Result<Dataset, DecodeError> {
    let first = &fields[0];
    if let Some(field) = fields.iter().find(|field| field.grid != first.grid) {
        return Err(DecodeError::Inconsistent(format!(
            "parameter {} has a different grid",
            field.parameter
        )));
    }
    if fields.iter().any(|field| field.level_type != first.level_type) {
        return Err(DecodeError::Inconsistent("mixed level types".to_string()));
    }
    if fields.iter().any(|field| field.number.is_some() != first.number.is_some()) {
        return Err(DecodeError::Inconsistent(
            "some messages have an ensemble member number and some do not".to_string(),
        ));
    }
    let grid = first.grid.clone();
    let level_name = level_name(first.level_type);

    let numbers = distinct(&fields, |field| field.number);
    let times = distinct(&fields, |field| field.time);
    let steps = distinct(&fields, |field| field.step);
    let mut levels = distinct(&fields, |field| field.level);
    if first.level_type == 100 {
        levels.reverse();
    }

    // number, time, step, level
    let leading = [
        first.number.is_some().then(|| Coordinate {
            name: "number",
            len: numbers.len(),
            data: VariableData::Int64(one_dimensional(numbers.iter().map(|n| n.unwrap_or_default()).collect())),
            attrs: attributes([
                ("long_name", "ensemble member numerical id".into()),
                ("standard_name", "realization".into()),
            ]),
        }),
        Some(Coordinate {
            name: "time",
            len: times.len(),
            data: VariableData::DateTime64(one_dimensional(times.clone())),
            attrs: attributes([
                ("long_name", "initial time of forecast".into()),
                ("standard_name", "forecast_reference_time".into()),
            ]),
        }),
        Some(Coordinate {
            name: "step",
            len: steps.len(),
            data: VariableData::TimeDelta64(one_dimensional(steps.clone())),
            attrs: attributes([
                ("long_name", "time since forecast_reference_time".into()),
                ("standard_name", "forecast_period".into()),
            ]),
        }),
        Some(Coordinate {
            name: level_name,
            len: levels.len(),
            data: VariableData::Float64(one_dimensional(levels.iter().map(|&l| f64::from(l)).collect())),
            attrs: if first.level_type == 100 {
                attributes([
                    ("long_name", "pressure".into()),
                    ("units", "hPa".into()),
                    ("positive", "down".into()),
                    ("standard_name", "air_pressure".into()),
                ])
            } else {
                attributes([("long_name", "original GRIB coordinate for key: level".into())])
            },
        }),
    ];
    let is_dim = |coordinate: &Coordinate| coordinate.len > 1 || coordinate.name == "time";

    let mut dataset = Dataset::new().with_attrs(attributes([
        ("GRIB_edition", 1.into()),
        (
            "GRIB_centre",
            if first.centre == ECMWF {
                "ecmf".into()
            } else {
                first.centre.to_string().into()
            },
        ),
        ("Conventions", "CF-1.7".into()),
    ]));
    let mut dims = Vec::new();
    for coordinate in leading.into_iter().flatten() {
        let variable = if is_dim(&coordinate) {
            dims.push((coordinate.name, coordinate.len));
            Variable::new([coordinate.name], coordinate.data)?
        } else {
            Variable::new(Vec::<String>::new(), scalar(&coordinate.data))?
        };
        dataset.add_coord(coordinate.name, variable.with_attrs(coordinate.attrs))?;
    }
    dataset.add_coord(
        "latitude",
        Variable::new(["latitude"], VariableData::Float64(one_dimensional(grid.latitudes.clone())))?
            .with_attrs(attributes([
                ("units", "degrees_north".into()),
                ("standard_name", "latitude".into()),
                ("long_name", "latitude".into()),
            ])),
    )?;
    dataset.add_coord(
        "longitude",
        Variable::new(["longitude"], VariableData::Float64(one_dimensional(grid.longitudes.clone())))?
            .with_attrs(attributes([
                ("units", "degrees_east".into()),
                ("standard_name", "longitude".into()),
                ("long_name", "longitude".into()),
            ])),
    )?;

    // valid_time = time + step over the time and step dimensions
    let step_is_dim = dims.iter().any(|(dim, _)| *dim == "step");
    let valid_time_dims: Vec<&str> = if step_is_dim { vec!["time", "step"] } else { vec!["time"] };
    let valid_time_shape: Vec<usize> = if step_is_dim {
        vec![times.len(), steps.len()]
    } else {
        vec![times.len()]
    };
    let add_step = |time: i64, step: i64| {
        time.checked_add(step).ok_or_else(|| {
            DecodeError::Inconsistent(format!(
                "valid time of reference time {time} and step {step} is out of range"
            ))
        })
    };
    let valid_times = if step_is_dim {
        times
            .iter()
            .flat_map(|&time| steps.iter().map(move |&step| add_step(time, step)))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        times
            .iter()
            .map(|&time| add_step(time, steps[0]))
            .collect::<Result<Vec<_>, _>>()?
    };
    let valid_time = ArrayD::from_shape_vec(IxDyn(&valid_time_shape), valid_times)
        .map_err(|err| DecodeError::Inconsistent(err.to_string()))?;
    dataset.add_coord(
        "valid_time",
        Variable::new(valid_time_dims, VariableData::DateTime64(valid_time))?.with_attrs(attributes([
            ("standard_name", "time".into()),
            ("long_name", "time".into()),
        ])),
    )?;

    // one data variable per parameter
    let (nj, ni) = (grid.latitudes.len(), grid.longitudes.len());
    let num_points = nj * ni;
    let mut shape: Vec<usize> = dims.iter().map(|(_, len)| *len).collect();
    shape.extend([nj, ni]);
    let num_slots: usize = dims.iter().map(|(_, len)| len).product();
    let mut by_parameter: BTreeMap<(u8, u8), Vec<&Field>> = BTreeMap::new();
    for field in &fields {
        by_parameter
            .entry((field.table, field.parameter))
            .or_default()
            .push(field);
    }
    for ((table, parameter_number), fields) in by_parameter {
        let (param_id, short_name, units, long_name) = parameter(table, parameter_number);
        let mut values = vec![f32::NAN; num_slots * num_points];
        let mut filled = vec![false; num_slots];
        for field in fields {
            let slot = dims.iter().fold(0, |slot, &(dim, len)| {
                let index = match dim {
                    "number" => position(&numbers, &field.number),
                    "time" => position(&times, &field.time),
                    "step" => position(&steps, &field.step),
                    _ => position(&levels, &field.level),
                };
                slot * len + index
            });
            if std::mem::replace(&mut filled[slot], true) {
                return Err(DecodeError::Inconsistent(format!(
                    "duplicate message for parameter {short_name}"
                )));
            }
            for (value, &field_value) in values[slot * num_points..(slot + 1) * num_points]
                .iter_mut()
                .zip(&field.values)
            {
                *value = field_value as f32;
            }
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|err| DecodeError::Inconsistent(err.to_string()))?;
        let variable_dims = dims
            .iter()
            .map(|(dim, _)| *dim)
            .chain(["latitude", "longitude"]);
        let variable = Variable::new(variable_dims, VariableData::Float32(data))?.with_attrs(attributes([
            ("GRIB_paramId", param_id.into()),
            ("GRIB_shortName", short_name.clone().into()),
            ("units", units.into()),
            ("long_name", long_name.into()),
        ]));
        dataset.add_data_var(&short_name, variable)?;
    }
    Ok(dataset)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// The properties of a synthetic GRIB 1 message.
    #[derive(Clone, Debug)]
    pub(crate) struct TestMessage {
        pub parameter: u8,
        pub level: u16,
        pub number: u8,
        /// Year, month, day, hour.
        pub date: (i32, u8, u8, u8),
        pub step_hours: u8,
        /// Latitudes and longitudes of the first and last points, in millidegrees.
        pub grid: (i32, i32, i32, i32),
        pub shape: (u16, u16),
        pub reference: f64,
        pub binary_scale: i16,
        pub decimal_scale: i16,
        pub packed: Vec<u16>,
        pub bitmap: Option<Vec<bool>>,
    }

    impl TestMessage {
        /// A 3x4 temperature field at 500 hPa on 2017-01-01 00:00 with values `offset + index`.
        pub(crate) fn new(parameter: u8, offset: f64) -> Self {
            Self {
                parameter,
                level: 500,
                number: 0,
                date: (2017, 1, 1, 0),
                step_hours: 0,
                grid: (90_000, 0, 84_000, 9_000),
                shape: (4, 3),
                reference: offset,
                binary_scale: 0,
                decimal_scale: 0,
                packed: (0..12).collect(),
                bitmap: None,
            }
        }
    }

    fn ibm(value: f64) -> [u8; 4] {
        if value == 0.0 {
            return [0; 4];
        }
        let sign = if value < 0.0 { 0x80 } else { 0 };
        let mut exponent = 64;
        let mut mantissa = value.abs();
        while mantissa >= 1.0 {
            mantissa /= 16.0;
            exponent += 1;
        }
        while mantissa < 1.0 / 16.0 {
            mantissa *= 16.0;
            exponent -= 1;
        }
        let mantissa = (mantissa * f64::from(1 << 24)).round() as u32;
        [
            sign | exponent,
            (mantissa >> 16) as u8,
            (mantissa >> 8) as u8,
            mantissa as u8,
        ]
    }

    fn u24(value: usize) -> [u8; 3] {
        [(value >> 16) as u8, (value >> 8) as u8, value as u8]
    }

    fn signed24(value: i32) -> [u8; 3] {
        let magnitude = value.unsigned_abs() as usize;
        let mut bytes = u24(magnitude);
        if value < 0 {
            bytes[0] |= 0x80;
        }
        bytes
    }

    fn signed16(value: i16) -> [u8; 2] {
        let mut bytes = value.unsigned_abs().to_be_bytes();
        if value < 0 {
            bytes[0] |= 0x80;
        }
        bytes
    }

    /// Encode a GRIB 1 message with an ECMWF MARS labelling local definition.
    pub(crate) fn encode(message: &TestMessage) -> Vec<u8> {
        let (year, month, day, hour) = message.date;
        let mut pds = vec![0u8; 52];
        pds[..3].copy_from_slice(&u24(52));
        pds[3] = 128;
        pds[4] = ECMWF;
        pds[6] = 255;
        pds[7] = 0x80 | if message.bitmap.is_some() { 0x40 } else { 0 };
        pds[8] = message.parameter;
        pds[9] = 100;
        pds[10..12].copy_from_slice(&message.level.to_be_bytes());
        pds[12] = ((year - 1) % 100 + 1) as u8;
        pds[13] = month;
        pds[14] = day;
        pds[15] = hour;
        pds[17] = 1;
        pds[18] = message.step_hours;
        pds[24] = ((year - 1) / 100 + 1) as u8;
        pds[26..28].copy_from_slice(&signed16(message.decimal_scale));
        pds[40] = 1;
        pds[49] = message.number;

        let (la1, lo1, la2, lo2) = message.grid;
        let (ni, nj) = message.shape;
        let mut gds = vec![0u8; 32];
        gds[..3].copy_from_slice(&u24(32));
        gds[4] = 255;
        gds[6..8].copy_from_slice(&ni.to_be_bytes());
        gds[8..10].copy_from_slice(&nj.to_be_bytes());
        gds[10..13].copy_from_slice(&signed24(la1));
        gds[13..16].copy_from_slice(&signed24(lo1));
        gds[16] = 0x80;
        gds[17..20].copy_from_slice(&signed24(la2));
        gds[20..23].copy_from_slice(&signed24(lo2));

        let bms = message.bitmap.as_ref().map(|bitmap| {
            let mut bms = vec![0u8; 6 + bitmap.len().div_ceil(8)];
            let length = bms.len();
            bms[..3].copy_from_slice(&u24(length));
            for (point, _) in bitmap.iter().enumerate().filter(|(_, present)| **present) {
                bms[6 + point / 8] |= 0x80 >> (point % 8);
            }
            bms
        });

        let mut bds = vec![0u8; 11];
        bds[4..6].copy_from_slice(&signed16(message.binary_scale));
        bds[6..10].copy_from_slice(&ibm(message.reference));
        bds[10] = 16;
        for value in &message.packed {
            bds.extend(value.to_be_bytes());
        }
        let length = bds.len();
        bds[..3].copy_from_slice(&u24(length));

        let sections = [pds, gds, bms.unwrap_or_default(), bds];
        let length = 8 + sections.iter().map(Vec::len).sum::<usize>() + 4;
        let mut bytes = b"GRIB".to_vec();
        bytes.extend(u24(length));
        bytes.push(1);
        for section in sections {
            bytes.extend(section);
        }
        bytes.extend(b"7777");
        bytes
    }

    /// Messages shaped like the ERA5 levels and members fixture: 2 members, 2 times, 2 levels, 2 parameters.
    pub(crate) fn era5_like() -> Vec<u8> {
        let mut bytes = Vec::new();
        for parameter in [129, 130] {
            for number in 0..2 {
                for day in 1..=2 {
                    for level in [500, 850] {
                        let mut message = TestMessage::new(parameter, f64::from(level) + f64::from(day) * 10.0);
                        message.number = number;
                        message.date = (2017, 1, day, 0);
                        message.level = level;
                        message.reference += f64::from(number) * 1000.0 + f64::from(parameter);
                        bytes.extend(encode(&message));
                    }
                }
            }
        }
        bytes
    }

    #[test]
    fn grib1_ibm_float() {
        for value in [0.0, 1.0, -1.0, 118.625, 250.0, 54_000.0] {
            assert_eq!(ibm_float(&ibm(value)), value);
        }
        // 0xC276A000 is -118.625
        assert_eq!(ibm_float(&[0xC2, 0x76, 0xA0, 0x00]), -118.625);
    }

    #[test]
    fn grib1_single_message() {
        let mut message = TestMessage::new(130, 250.0);
        message.step_hours = 6;
        let dataset = decode_bytes(&encode(&message)).unwrap();

        assert_eq!(
            dataset.dims().collect::<Vec<_>>(),
            vec![("time", 1), ("latitude", 3), ("longitude", 4)]
        );
        assert_eq!(dataset.coords()["step"].shape(), &[] as &[usize]);
        assert_eq!(
            dataset.coords()["step"].data(),
            &VariableData::TimeDelta64(ArrayD::from_elem(IxDyn(&[]), 6 * 3_600 * NANOSECONDS_PER_SECOND))
        );
        assert_eq!(
            dataset.coords()["isobaricInhPa"].data(),
            &VariableData::Float64(ArrayD::from_elem(IxDyn(&[]), 500.0))
        );
        assert!(dataset.variable("number").is_some());
        assert_eq!(
            dataset.coords()["latitude"].data(),
            &VariableData::Float64(one_dimensional(vec![90.0, 87.0, 84.0]))
        );
        assert_eq!(
            dataset.coords()["longitude"].data(),
            &VariableData::Float64(one_dimensional(vec![0.0, 3.0, 6.0, 9.0]))
        );
        // 2017-01-01T00:00:00
        let time = 1_483_228_800 * NANOSECONDS_PER_SECOND;
        assert_eq!(
            dataset.coords()["time"].data(),
            &VariableData::DateTime64(one_dimensional(vec![time]))
        );
        assert_eq!(
            dataset.coords()["valid_time"].data(),
            &VariableData::DateTime64(one_dimensional(vec![time + 6 * 3_600 * NANOSECONDS_PER_SECOND]))
        );

        let t = &dataset.data_vars()["t"];
        assert_eq!(t.dims(), &["time", "latitude", "longitude"]);
        assert_eq!(t.attrs()["GRIB_paramId"], 130);
        assert_eq!(t.attrs()["units"], "K");
        let VariableData::Float32(values) = t.data() else {
            panic!("expected float32 data");
        };
        assert_eq!(values[[0, 0, 0]], 250.0);
        assert_eq!(values[[0, 2, 3]], 261.0);
        assert_eq!(dataset.attrs()["GRIB_centre"], "ecmf");
    }

    #[test]
    fn grib1_scale_factors() {
        let mut message = TestMessage::new(157, 0.0);
        message.decimal_scale = 1;
        message.binary_scale = -1;
        let dataset = decode_bytes(&encode(&message)).unwrap();
        let VariableData::Float32(values) = dataset.data_vars()["r"].data() else {
            panic!("expected float32 data");
        };
        // (0 + X / 2) / 10
        assert!((values[[0, 0, 1]] - 0.05).abs() < 1e-6);
        assert!((values[[0, 2, 3]] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn grib1_bitmap() {
        let mut message = TestMessage::new(167, 270.0);
        let bitmap: Vec<bool> = (0..12).map(|point| point % 2 == 0).collect();
        message.packed = (0..6).collect();
        message.bitmap = Some(bitmap);
        let dataset = decode_bytes(&encode(&message)).unwrap();
        let VariableData::Float32(values) = dataset.data_vars()["2t"].data() else {
            panic!("expected float32 data");
        };
        assert_eq!(values[[0, 0, 0]], 270.0);
        assert!(values[[0, 0, 1]].is_nan());
        assert_eq!(values[[0, 0, 2]], 271.0);
        assert!(values[[0, 2, 3]].is_nan());
    }

    #[test]
    fn grib1_era5_like() {
        let dataset = decode_bytes(&era5_like()).unwrap();
        assert_eq!(
            dataset.dims().collect::<Vec<_>>(),
            vec![
                ("number", 2),
                ("time", 2),
                ("isobaricInhPa", 2),
                ("latitude", 3),
                ("longitude", 4)
            ]
        );
        assert_eq!(
            dataset.coords()["isobaricInhPa"].data(),
            &VariableData::Float64(one_dimensional(vec![850.0, 500.0]))
        );
        assert_eq!(dataset.coords()["valid_time"].dims(), &["time"]);
        assert_eq!(dataset.data_vars().keys().collect::<Vec<_>>(), vec!["t", "z"]);
        let VariableData::Float32(z) = dataset.data_vars()["z"].data() else {
            panic!("expected float32 data");
        };
        // member 1, day 2, 850 hPa, first point
        assert_eq!(z[[1, 1, 0, 0, 0]], 850.0 + 20.0 + 1000.0 + 129.0);
        // member 0, day 1, 500 hPa, last point
        assert_eq!(z[[0, 0, 1, 2, 3]], 500.0 + 10.0 + 129.0 + 11.0);
    }

    #[test]
    fn grib1_missing_combination() {
        let mut bytes = encode(&TestMessage::new(130, 0.0));
        let mut later = TestMessage::new(130, 0.0);
        later.date = (2017, 1, 2, 0);
        later.level = 850;
        bytes.extend(encode(&later));
        let dataset = decode_bytes(&bytes).unwrap();
        let VariableData::Float32(t) = dataset.data_vars()["t"].data() else {
            panic!("expected float32 data");
        };
        // time 0 has no 850 hPa field
        assert!(t[[0, 0, 0, 0]].is_nan());
        assert_eq!(t[[0, 1, 0, 0]], 0.0);
    }

    #[test]
    fn grib1_invalid() {
        assert!(matches!(decode_bytes(b""), Err(DecodeError::NoMessages)));
        assert!(matches!(decode_bytes(b"not a grib file"), Err(DecodeError::NoMessages)));

        let bytes = encode(&TestMessage::new(130, 0.0));
        assert!(matches!(
            decode_bytes(&bytes[..bytes.len() - 10]),
            Err(DecodeError::Truncated(0))
        ));

        let mut edition2 = bytes.clone();
        edition2[7] = 2;
        assert!(matches!(
            decode_bytes(&edition2),
            Err(DecodeError::UnsupportedEdition { edition: 2, .. })
        ));

        let mut no_end = bytes.clone();
        let length = no_end.len();
        no_end[length - 1] = b'8';
        assert!(matches!(decode_bytes(&no_end), Err(DecodeError::Malformed { .. })));

        let mut duplicate = bytes.clone();
        duplicate.extend(&bytes);
        assert!(matches!(decode_bytes(&duplicate), Err(DecodeError::Inconsistent(_))));
    }

    #[test]
    fn grib1_empty_grid() {
        assert!(axis_values(0, 1000, 0).is_empty());
        assert_eq!(axis_values(500, 1000, 1), vec![0.5]);
        for shape in [(0, 3), (4, 0)] {
            let mut message = TestMessage::new(130, 0.0);
            message.shape = shape;
            message.packed = Vec::new();
            assert!(matches!(
                decode_bytes(&encode(&message)),
                Err(DecodeError::Malformed { .. })
            ));
        }
    }
}
