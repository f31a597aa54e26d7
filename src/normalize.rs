//! Resolves the loosely typed `estado` field into the per-kind representation.
//!
//! Integer kinds accept integers, numbers (truncated toward zero) and base-10
//! strings. The text kind renders any scalar to its canonical string and
//! cannot fail; numbers use the shortest digits, switching to exponent form
//! for large and small magnitudes. Timestamps and serial numbers are passed
//! through untouched.

use crate::error::NormalizationError;
use crate::models::{InboundReading, NormalizedReading, RawState, SensorKind, SensorState, StateRepr};

// ---

/// Coerce `raw` into the state representation required by `kind`.
pub fn normalize(kind: SensorKind, raw: RawState) -> Result<SensorState, NormalizationError> {
    // ---
    match kind.state_repr() {
        StateRepr::Integer => integer_state(kind, raw).map(SensorState::Integer),
        StateRepr::Text => Ok(SensorState::Text(render(raw))),
    }
}

/// Build the kind-specific reading from an inbound envelope.
pub fn normalize_reading(
    kind: SensorKind,
    reading: InboundReading,
) -> Result<NormalizedReading, NormalizationError> {
    // ---
    let estado = normalize(kind, reading.estado)?;

    Ok(NormalizedReading {
        numero_serie: reading.numero_serie,
        kind,
        fecha_activacion: reading.fecha_activacion,
        fecha_desactivacion: reading.fecha_desactivacion,
        estado,
    })
}

fn integer_state(kind: SensorKind, raw: RawState) -> Result<i64, NormalizationError> {
    // ---
    let invalid = |reason: String| NormalizationError { kind, reason };

    match raw {
        RawState::Integer(value) => Ok(value),
        RawState::Number(value) => {
            let truncated = value.trunc();
            // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                Ok(truncated as i64)
            } else {
                Err(invalid(format!("{value} is out of integer range")))
            }
        }
        RawState::Text(text) => text
            .parse::<i64>()
            .map_err(|e| invalid(format!("{text:?} is not an integer ({e})"))),
        RawState::Flag(_) => Err(invalid("boolean is not an integer".to_string())),
        RawState::Null => Err(invalid("missing value".to_string())),
    }
}

fn render(raw: RawState) -> String {
    // ---
    match raw {
        // JSON numbers are one type to upstream clients; integers render alike
        RawState::Integer(value) => render_number(value as f64),
        RawState::Number(value) => render_number(value),
        RawState::Text(text) => text,
        RawState::Flag(flag) => flag.to_string(),
        RawState::Null => "null".to_string(),
    }
}

/// Shortest round-trip digits, in exponent form when the decimal exponent
/// is below -4 or at least 6: `23.5`, `123456`, `1e+06`, `1.5e-07`.
fn render_number(value: f64) -> String {
    // ---
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if (-4..6).contains(&exponent) {
        // f64 Display drops the fraction for whole numbers: 23.0 -> "23"
        value.to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}
