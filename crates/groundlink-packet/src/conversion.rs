use std::fmt;

use groundlink_codec::{DataType, Value};

use crate::error::ConversionError;
use crate::packet::Packet;

/// Maps an item value between its raw and engineering representations.
///
/// Conversions are pure: they see the packet only through `&Packet`, so a
/// conversion that depends on sibling items reads them with
/// [`Packet::read_raw`].
pub trait Conversion: fmt::Debug + Send + Sync {
    fn convert(&self, value: &Value, packet: &Packet) -> Result<Value, ConversionError>;

    /// Type of the values this conversion produces.
    fn converted_type(&self) -> DataType {
        DataType::Float
    }
}

fn numeric(value: &Value) -> Result<f64, ConversionError> {
    value
        .as_f64()
        .ok_or(ConversionError::NotNumeric(value.kind()))
}

fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, coefficient| acc * x + coefficient)
}

/// `c0 + c1*x + c2*x^2 + ...`
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialConversion {
    coefficients: Vec<f64>,
}

impl PolynomialConversion {
    pub fn new(coefficients: impl Into<Vec<f64>>) -> Self {
        Self {
            coefficients: coefficients.into(),
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl Conversion for PolynomialConversion {
    fn convert(&self, value: &Value, _packet: &Packet) -> Result<Value, ConversionError> {
        Ok(Value::Float(evaluate(&self.coefficients, numeric(value)?)))
    }
}

/// One piece of a [`SegmentedPolynomialConversion`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Smallest input this segment applies to.
    pub lower_bound: f64,
    pub coefficients: Vec<f64>,
}

/// Piecewise polynomial: each input uses the segment with the largest lower
/// bound not above it. Inputs below every bound use the lowest segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedPolynomialConversion {
    /// Sorted by descending lower bound.
    segments: Vec<Segment>,
}

impl SegmentedPolynomialConversion {
    pub fn new(mut segments: Vec<Segment>) -> Self {
        segments.sort_by(|a, b| b.lower_bound.total_cmp(&a.lower_bound));
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl Conversion for SegmentedPolynomialConversion {
    fn convert(&self, value: &Value, _packet: &Packet) -> Result<Value, ConversionError> {
        let x = numeric(value)?;
        let segment = self
            .segments
            .iter()
            .find(|segment| x >= segment.lower_bound)
            .or_else(|| self.segments.last());
        match segment {
            Some(segment) => Ok(Value::Float(evaluate(&segment.coefficients, x))),
            None => Err(ConversionError::Failed(
                "segmented polynomial has no segments".to_string(),
            )),
        }
    }
}

/// Conversion backed by a closure.
pub struct FnConversion<F> {
    name: &'static str,
    converted_type: DataType,
    function: F,
}

impl<F> FnConversion<F>
where
    F: Fn(&Value, &Packet) -> Result<Value, ConversionError> + Send + Sync,
{
    pub fn new(name: &'static str, converted_type: DataType, function: F) -> Self {
        Self {
            name,
            converted_type,
            function,
        }
    }
}

impl<F> fmt::Debug for FnConversion<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConversion")
            .field("name", &self.name)
            .field("converted_type", &self.converted_type)
            .finish()
    }
}

impl<F> Conversion for FnConversion<F>
where
    F: Fn(&Value, &Packet) -> Result<Value, ConversionError> + Send + Sync,
{
    fn convert(&self, value: &Value, packet: &Packet) -> Result<Value, ConversionError> {
        (self.function)(value, packet)
    }

    fn converted_type(&self) -> DataType {
        self.converted_type
    }
}
