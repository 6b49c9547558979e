//! Piecewise one-dimensional curves used as lookup tables.
//!
//! A curve is a chain of elements between consecutive parameter nodes. Within an element
//! the element xi runs from 0 at the lower node to 1 at the upper node.
use crate::error::FieldError;
use crate::Real;
use log::warn;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveBasis {
    LinearLagrange,
    /// Cubic Hermite with nodal derivatives given with respect to the parameter.
    CubicHermite,
}

/// How parameters outside the range of the curve are mapped into it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtendMode {
    #[default]
    Clamp,
    /// Repeats the curve periodically.
    Cycle,
    /// Repeats the curve, reversing every other repetition.
    Swing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveNode<T> {
    pub parameter: T,
    pub values: Vec<T>,
    /// Derivatives of the values with respect to the parameter. Empty for linear curves.
    pub derivatives: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve<T> {
    num_components: usize,
    basis: CurveBasis,
    #[serde(default)]
    extend_mode: ExtendMode,
    nodes: Vec<CurveNode<T>>,
}

impl<T: Real> Curve<T> {
    pub fn new(num_components: usize, basis: CurveBasis) -> Self {
        Self {
            num_components,
            basis,
            extend_mode: ExtendMode::default(),
            nodes: Vec::new(),
        }
    }

    pub fn with_extend_mode(mut self, extend_mode: ExtendMode) -> Self {
        self.extend_mode = extend_mode;
        self
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn basis(&self) -> CurveBasis {
        self.basis
    }

    pub fn extend_mode(&self) -> ExtendMode {
        self.extend_mode
    }

    pub fn set_extend_mode(&mut self, extend_mode: ExtendMode) {
        self.extend_mode = extend_mode;
    }

    pub fn nodes(&self) -> &[CurveNode<T>] {
        &self.nodes
    }

    /// Appends a node. Parameters must be non-decreasing.
    pub fn add_node(&mut self, parameter: T, values: &[T], derivatives: &[T]) -> Result<(), FieldError> {
        let expected_derivatives = match self.basis {
            CurveBasis::LinearLagrange => 0,
            CurveBasis::CubicHermite => self.num_components,
        };
        if values.len() != self.num_components || derivatives.len() != expected_derivatives {
            return Err(FieldError::InvalidArgument(format!(
                "curve node needs {} values and {} derivatives, got {} and {}",
                self.num_components,
                expected_derivatives,
                values.len(),
                derivatives.len()
            )));
        }
        if let Some(last) = self.nodes.last() {
            if parameter < last.parameter {
                return Err(FieldError::InvalidArgument(
                    "curve parameters must be non-decreasing".to_string(),
                ));
            }
        }
        self.nodes.push(CurveNode {
            parameter,
            values: values.to_vec(),
            derivatives: derivatives.to_vec(),
        });
        Ok(())
    }

    pub fn parameter_range(&self) -> Option<(T, T)> {
        Some((self.nodes.first()?.parameter, self.nodes.last()?.parameter))
    }

    /// Maps a parameter into the range of the curve.
    ///
    /// Returns the mapped parameter and the sign of d(mapped)/d(parameter).
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn extend(&self, parameter: T, start: T, end: T) -> (T, T) {
        if parameter >= start && parameter <= end {
            return (parameter, 1.0);
        }
        let range = end - start;
        match self.extend_mode {
            ExtendMode::Clamp => (parameter.clamp(start, end), 1.0),
            ExtendMode::Cycle | ExtendMode::Swing if range > 0.0 => {
                let repetitions = ((parameter - start) / range).floor();
                let mut t = parameter - repetitions * range;
                let mut sign = 1.0;
                let half = repetitions * 0.5;
                let odd = half.floor() != half;
                if self.extend_mode == ExtendMode::Swing && odd {
                    t = start + end - t;
                    sign = -1.0;
                }
                (t, sign)
            }
            ExtendMode::Cycle | ExtendMode::Swing => (start, 1.0),
        }
    }

    /// Evaluates the curve at `parameter`.
    ///
    /// Writes the values and, if requested, their derivatives with respect to the
    /// parameter. Elements of zero length give zero derivatives.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn evaluate(&self, parameter: T, values: &mut [T], derivatives: Option<&mut [T]>) -> Result<(), FieldError> {
        let derivatives_len = derivatives.as_deref().map_or(self.num_components, |d| d.len());
        if values.len() != self.num_components || derivatives_len != self.num_components {
            return Err(FieldError::InvalidArgument(format!(
                "curve with {} components cannot write {} values and {} derivatives",
                self.num_components,
                values.len(),
                derivatives_len
            )));
        }
        let (start, end) = self.parameter_range().ok_or_else(|| {
            FieldError::InvalidArgument("cannot evaluate a curve without nodes".to_string())
        })?;
        if self.nodes.len() == 1 {
            values.copy_from_slice(&self.nodes[0].values);
            if let Some(derivatives) = derivatives {
                derivatives.fill(0.0);
            }
            return Ok(());
        }

        let (t, sign) = self.extend(parameter, start, end);
        let mut upper = 1;
        while upper + 1 < self.nodes.len() && t > self.nodes[upper].parameter {
            upper += 1;
        }
        let (a, b) = (&self.nodes[upper - 1], &self.nodes[upper]);
        let delta = b.parameter - a.parameter;
        let xi = if delta != 0.0 { (t - a.parameter) / delta } else { 0.0 };

        let xi2 = xi * xi;
        let xi3 = xi2 * xi;
        match self.basis {
            CurveBasis::LinearLagrange => {
                for k in 0..self.num_components {
                    values[k] = (1.0 - xi) * a.values[k] + xi * b.values[k];
                }
            }
            CurveBasis::CubicHermite => {
                let h00 = 2.0 * xi3 - 3.0 * xi2 + 1.0;
                let h10 = xi3 - 2.0 * xi2 + xi;
                let h01 = -2.0 * xi3 + 3.0 * xi2;
                let h11 = xi3 - xi2;
                for k in 0..self.num_components {
                    values[k] = h00 * a.values[k]
                        + h10 * delta * a.derivatives[k]
                        + h01 * b.values[k]
                        + h11 * delta * b.derivatives[k];
                }
            }
        }

        if let Some(derivatives) = derivatives {
            if delta <= 0.0 {
                warn!(
                    "Curve element between parameters {} and {} has no length; using zero derivative",
                    a.parameter, b.parameter
                );
                derivatives.fill(0.0);
                return Ok(());
            }
            match self.basis {
                CurveBasis::LinearLagrange => {
                    for k in 0..self.num_components {
                        derivatives[k] = sign * (b.values[k] - a.values[k]) / delta;
                    }
                }
                CurveBasis::CubicHermite => {
                    let dh00 = 6.0 * xi2 - 6.0 * xi;
                    let dh10 = 3.0 * xi2 - 4.0 * xi + 1.0;
                    let dh01 = -6.0 * xi2 + 6.0 * xi;
                    let dh11 = 3.0 * xi2 - 2.0 * xi;
                    for k in 0..self.num_components {
                        let dvalue_dxi = dh00 * a.values[k]
                            + dh10 * delta * a.derivatives[k]
                            + dh01 * b.values[k]
                            + dh11 * delta * b.derivatives[k];
                        derivatives[k] = sign * dvalue_dxi / delta;
                    }
                }
            }
        }
        Ok(())
    }
}
