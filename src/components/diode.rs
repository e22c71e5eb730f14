//! Diode models: a piecewise-linear ideal diode and a Shockley-law diode
//! driven by a [`DiodeData`] physical model.

use std::f64::consts::SQRT_2;
use std::fmt;

use tracing::{trace, warn};

use super::{impl_downcast, Device, DynamicResistor, Port, Terminals};
use crate::error::{MnaError, Result};
use crate::solver::MnaSystem;

/// Boltzmann constant (J/K)
pub const BOLTZMANN: f64 = 1.380649e-23;
/// Elementary charge (C)
pub const ELEMENTARY_CHARGE: f64 = 1.602176634e-19;
/// Reverse current at which the Zener knee is placed (A)
pub const ZENER_KNEE_CURRENT: f64 = -5e-3;
/// Junction temperature a [`RealisticDiode`] starts at (K)
pub const DEFAULT_TEMPERATURE: f64 = 300.0;
/// Largest exponent the Shockley law is evaluated at
pub const MAX_EXPONENT: f64 = 100.0;

/// A diode that is either a small or a huge resistor depending on bias.
///
/// Converges in at most one extra substep: a single resistance change can
/// never flip the sign of the port voltage within a tick.
#[derive(Debug, Clone)]
pub struct IdealDiode {
    resistor: DynamicResistor,
    /// Resistance when forward-biased (Ω)
    pub min_resistance: f64,
    /// Resistance when reverse-biased (Ω)
    pub max_resistance: f64,
}

impl IdealDiode {
    pub fn new() -> Self {
        let max_resistance = 1e10;
        Self {
            resistor: DynamicResistor::new(max_resistance).named("d"),
            min_resistance: 1e-3,
            max_resistance,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.resistor.name = name.into();
        self
    }

    pub fn resistance(&self) -> f64 {
        self.resistor.resistance()
    }

    pub fn is_conducting(&self) -> bool {
        self.resistor.resistance() <= self.min_resistance
    }

    pub fn current(&self) -> f64 {
        self.resistor.current()
    }

    pub fn power(&self) -> f64 {
        self.resistor.power()
    }
}

impl Default for IdealDiode {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for IdealDiode {
    impl_downcast!(IdealDiode);

    fn name(&self) -> &str {
        &self.resistor.name
    }

    fn terminals(&self) -> &Terminals {
        self.resistor.terminals()
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        self.resistor.terminals_mut()
    }

    fn check(&self) -> Result<()> {
        let name = &self.resistor.name;
        if !(self.min_resistance.is_finite() && self.min_resistance > 0.0) {
            return Err(MnaError::invalid_parameter(name, "min_resistance", self.min_resistance));
        }
        if !(self.max_resistance.is_finite() && self.max_resistance >= self.min_resistance) {
            return Err(MnaError::invalid_parameter(name, "max_resistance", self.max_resistance));
        }
        Ok(())
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        self.resistor.stamp(sys)
    }

    fn sim_step(&mut self, sys: &mut MnaSystem, _slack: f64) -> Result<()> {
        let u = self.u();
        let r = self.resistor.resistance();
        if u > 0.0 {
            if r > self.min_resistance {
                self.resistor.set_resistance(sys, self.min_resistance)?;
            }
        } else if r < self.max_resistance {
            self.resistor.set_resistance(sys, self.max_resistance)?;
        }
        trace!(diode = %self.resistor.name, u, r = self.resistor.resistance(), "ideal diode step");
        Ok(())
    }
}

impl fmt::Display for IdealDiode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bias = if self.is_conducting() {
            "forward bias (conducting)"
        } else {
            "reverse bias (blocking)"
        };
        write!(
            f,
            "[ideal diode {}: {:.6}V, {:.6}A, {}Ω, {bias}]",
            self.resistor.name,
            self.u(),
            self.current(),
            self.resistance()
        )
    }
}

/// Physical parameters of a diode model, as used by [`RealisticDiode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeData {
    pub name: &'static str,
    /// Saturation current (A)
    pub saturation_current: f64,
    /// Series resistance (Ω)
    pub series_resistance: f64,
    /// Emission coefficient
    pub emission_coefficient: f64,
    /// Reverse breakdown voltage (V); zero for non-Zener models
    pub breakdown_voltage: f64,
}

const fn model(
    name: &'static str,
    saturation_current: f64,
    series_resistance: f64,
    emission_coefficient: f64,
    breakdown_voltage: f64,
) -> DiodeData {
    DiodeData {
        name,
        saturation_current,
        series_resistance,
        emission_coefficient,
        breakdown_voltage,
    }
}

impl DiodeData {
    /// Known diode models.
    pub const MODELS: [DiodeData; 11] = [
        model("spice-default", 1e-14, 0.0, 1.0, 0.0),
        model("falstad-default", 1.7143528192808883e-7, 0.0, 2.0, 0.0),
        model("falstad-zener", 1.7143528192808883e-7, 0.0, 2.0, 5.6),
        model("falstad-old-led", 2.2349907006671927e-18, 0.0, 2.0, 0.0),
        model("falstad-led", 93.2e-12, 0.042, 3.73, 0.0),
        model("schottky-1N5711", 315e-9, 2.8, 2.03, 70.0),
        model("schottky-1N5712", 680e-12, 12.0, 1.003, 20.0),
        model("germanium-1N34", 200e-12, 84e-3, 2.19, 60.0),
        model("1N4004", 18.8e-9, 28.6e-3, 2.0, 400.0),
        model("1N3891", 63e-9, 9.6e-3, 2.0, 0.0),
        model("switching-1N4148", 4.35e-9, 0.6458, 1.0, 75.0),
    ];

    /// General-purpose default model.
    pub const DEFAULT: DiodeData = Self::MODELS[1];

    /// Look a model up by name.
    pub fn by_name(name: &str) -> Result<DiodeData> {
        Self::MODELS
            .iter()
            .find(|m| m.name == name)
            .copied()
            .ok_or_else(|| MnaError::UnknownDiodeModel {
                name: name.to_string(),
            })
    }

    /// Thermal voltage `kT/q` at `temp` kelvin (about 25.9 mV at 300 K).
    pub fn thermal_voltage(temp: f64) -> f64 {
        temp * BOLTZMANN / ELEMENTARY_CHARGE
    }

    pub fn zener_coefficient(temp: f64) -> f64 {
        1.0 / Self::thermal_voltage(temp)
    }

    pub fn is_zener(&self) -> bool {
        self.breakdown_voltage != 0.0
    }

    /// Emission coefficient times thermal voltage.
    pub fn scale_voltage_at(&self, temp: f64) -> f64 {
        self.emission_coefficient * Self::thermal_voltage(temp)
    }

    pub fn diode_coefficient_at(&self, temp: f64) -> f64 {
        1.0 / self.scale_voltage_at(temp)
    }

    /// Forward voltage drop at 1 A.
    pub fn forward_drop_at(&self, temp: f64) -> f64 {
        (1.0 / self.saturation_current + 1.0).ln() * self.scale_voltage_at(temp)
    }

    /// Forward voltage above which Newton steps are damped.
    pub fn critical_voltage_at(&self, temp: f64) -> f64 {
        let scale = self.scale_voltage_at(temp);
        scale * (scale / (SQRT_2 * self.saturation_current)).ln()
    }

    /// Reverse-region counterpart of [`Self::critical_voltage_at`]; positive.
    pub fn zener_critical_voltage_at(&self, temp: f64) -> f64 {
        let vt = Self::thermal_voltage(temp);
        vt * (vt / (SQRT_2 * self.saturation_current)).ln()
    }

    /// Position of the Zener knee for a (negative) reverse `current`.
    pub fn zener_offset_at(&self, temp: f64, current: f64) -> f64 {
        if !self.is_zener() {
            return 0.0;
        }
        self.breakdown_voltage
            - (-(1.0 + current / self.saturation_current)).ln() * Self::thermal_voltage(temp)
    }

    /// Limit a Newton update of the junction voltage from `v_old` to `v_new`.
    ///
    /// Large jumps past the critical voltage are pulled back onto a
    /// logarithmic path so the exponential cannot run away. The reverse
    /// branch of a Zener model is handled in mirrored coordinates.
    pub fn solve_iter(&self, temp: f64, v_new: f64, v_old: f64) -> f64 {
        if v_new < 0.0 && self.is_zener() {
            let offset = self.zener_offset_at(temp, ZENER_KNEE_CURRENT);
            let critical = self.zener_critical_voltage_at(temp);
            let vt = Self::thermal_voltage(temp);
            let limited = limit_step(-v_new - offset, -v_old - offset, vt, critical);
            -(limited + offset)
        } else {
            let scale = self.scale_voltage_at(temp);
            limit_step(v_new, v_old, scale, self.critical_voltage_at(temp))
        }
    }

    /// Current at junction voltage `v` (A).
    pub fn current_at(&self, temp: f64, v: f64) -> f64 {
        let is = self.saturation_current;
        let ex = limited_exp(v * self.diode_coefficient_at(temp));
        if v >= 0.0 || !self.is_zener() {
            (ex - 1.0) * is
        } else {
            (ex - self.zener_exp(temp, v) - 1.0) * is
        }
    }

    /// Small-signal conductance at junction voltage `v` (S), including a
    /// leakage floor of `0.01 * Is`.
    pub fn conductance_at(&self, temp: f64, v: f64) -> f64 {
        let is = self.saturation_current;
        let coefficient = self.diode_coefficient_at(temp);
        let ex = limited_exp(v * coefficient);
        let slope = if v >= 0.0 || !self.is_zener() {
            coefficient * ex
        } else {
            coefficient * ex + Self::zener_coefficient(temp) * self.zener_exp(temp, v)
        };
        is * 0.01 + is * slope
    }

    fn zener_exp(&self, temp: f64, v: f64) -> f64 {
        let zc = Self::zener_coefficient(temp);
        limited_exp((-v - self.zener_offset_at(temp, ZENER_KNEE_CURRENT)) * zc)
    }
}

/// `exp(x)` with `x` capped at [`MAX_EXPONENT`], so currents and
/// conductances stay finite far outside the useful operating range.
fn limited_exp(x: f64) -> f64 {
    x.min(MAX_EXPONENT).exp()
}

impl Default for DiodeData {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn limit_step(v_new: f64, v_old: f64, scale: f64, critical: f64) -> f64 {
    if v_new <= critical || (v_new - v_old).abs() <= 2.0 * scale {
        return v_new;
    }
    let tmp = 1.0 + (v_new - v_old) / scale;
    if v_old > 0.0 && tmp > 0.0 {
        v_old + scale * tmp.ln()
    } else if v_old > 0.0 {
        critical
    } else {
        scale * (v_new / scale).ln()
    }
}

/// A diode following the Shockley law of its [`DiodeData`] model,
/// re-linearized every substep as a conductance plus companion current.
#[derive(Debug, Clone)]
pub struct RealisticDiode {
    resistor: DynamicResistor,
    model: DiodeData,
    /// Junction temperature (K)
    pub temperature: f64,
    last_potential: f64,
    companion: f64,
}

impl RealisticDiode {
    pub fn new(model: DiodeData) -> Self {
        let g = model.conductance_at(DEFAULT_TEMPERATURE, 0.0);
        Self {
            resistor: DynamicResistor::new(1.0 / g).named("d"),
            model,
            temperature: DEFAULT_TEMPERATURE,
            last_potential: 0.0,
            companion: 0.0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.resistor.name = name.into();
        self
    }

    pub fn model(&self) -> &DiodeData {
        &self.model
    }

    pub fn resistance(&self) -> f64 {
        self.resistor.resistance()
    }

    pub fn companion_current(&self) -> f64 {
        self.companion
    }

    /// Current through the linearized model at the present port voltage.
    pub fn current(&self) -> f64 {
        self.resistor.current() + self.companion
    }

    pub fn power(&self) -> f64 {
        self.current() * self.u()
    }

    fn set_companion(&mut self, sys: &mut MnaSystem, companion: f64) {
        sys.stamp_current_source(self.pos(), self.neg(), companion - self.companion);
        self.companion = companion;
    }
}

impl Default for RealisticDiode {
    fn default() -> Self {
        Self::new(DiodeData::DEFAULT)
    }
}

impl Device for RealisticDiode {
    impl_downcast!(RealisticDiode);

    fn name(&self) -> &str {
        &self.resistor.name
    }

    fn terminals(&self) -> &Terminals {
        self.resistor.terminals()
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        self.resistor.terminals_mut()
    }

    fn check(&self) -> Result<()> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(MnaError::invalid_parameter(
                &self.resistor.name,
                "temperature",
                self.temperature,
            ));
        }
        let is = self.model.saturation_current;
        if !(is.is_finite() && is > 0.0) {
            return Err(MnaError::invalid_parameter(&self.resistor.name, "saturation_current", is));
        }
        Ok(())
    }

    fn stamp(&mut self, sys: &mut MnaSystem) -> Result<()> {
        self.resistor.stamp(sys)?;
        sys.stamp_current_source(self.pos(), self.neg(), self.companion);
        Ok(())
    }

    fn sim_step(&mut self, sys: &mut MnaSystem, slack: f64) -> Result<()> {
        let u = self.u();
        if (u - self.last_potential).abs() < slack {
            return Ok(());
        }

        let temp = self.temperature;
        let v = self.model.solve_iter(temp, u, self.last_potential);
        self.last_potential = v;

        let geq = self.model.conductance_at(temp, v);
        let companion = self.model.current_at(temp, v) - geq * v;
        trace!(diode = %self.resistor.name, u, v, geq, companion, "diode relinearized");
        if !(geq.is_finite() && geq > 0.0 && companion.is_finite()) {
            warn!(diode = %self.resistor.name, u, v, "diode linearization not finite, keeping previous model");
            return Ok(());
        }

        self.resistor.set_resistance(sys, 1.0 / geq)?;
        self.set_companion(sys, companion);
        Ok(())
    }
}

impl fmt::Display for RealisticDiode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[diode ({}) {}: {:.6}V, {:.6}A, {:.3e}Ω, {:.6}W]",
            self.model.name,
            self.resistor.name,
            self.u(),
            self.current(),
            self.resistance(),
            self.power()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_model_lookup() {
        let m = DiodeData::by_name("switching-1N4148").unwrap();
        assert_eq!(m.saturation_current, 4.35e-9);
        assert_eq!(m.breakdown_voltage, 75.0);
        assert!(matches!(
            DiodeData::by_name("nope"),
            Err(MnaError::UnknownDiodeModel { .. })
        ));
        assert_eq!(DiodeData::default().name, "falstad-default");
    }

    #[test]
    fn test_thermal_voltage() {
        assert_relative_eq!(DiodeData::thermal_voltage(300.0), 0.025852, epsilon = 1e-6);
    }

    #[test]
    fn test_zener_offset_only_for_zener() {
        let plain = DiodeData::by_name("1N3891").unwrap();
        assert_eq!(plain.zener_offset_at(300.0, ZENER_KNEE_CURRENT), 0.0);

        let zener = DiodeData::by_name("falstad-zener").unwrap();
        let offset = zener.zener_offset_at(300.0, ZENER_KNEE_CURRENT);
        assert!(offset > 0.0 && offset < zener.breakdown_voltage);
    }

    #[test]
    fn test_solve_iter_passes_small_steps() {
        let m = DiodeData::by_name("switching-1N4148").unwrap();
        assert_eq!(m.solve_iter(300.0, 0.2, 0.19), 0.2);
        assert_eq!(m.solve_iter(300.0, 0.7, 0.69), 0.7);
    }

    #[test]
    fn test_solve_iter_damps_large_forward_jump() {
        let m = DiodeData::by_name("switching-1N4148").unwrap();
        let limited = m.solve_iter(300.0, 5.0, 0.0);
        assert!(limited < m.critical_voltage_at(300.0));

        let from_positive = m.solve_iter(300.0, 5.0, 0.6);
        assert!(from_positive > 0.6 && from_positive < 5.0);
    }

    #[test]
    fn test_conductance_grows_with_forward_bias() {
        let m = DiodeData::by_name("switching-1N4148").unwrap();
        let low = m.conductance_at(300.0, 0.3);
        let high = m.conductance_at(300.0, 0.6);
        assert!(high > low);
        assert!(m.current_at(300.0, 0.6) > m.current_at(300.0, 0.3));
    }

    #[test]
    fn test_forward_drop_carries_one_amp() {
        let m = DiodeData::by_name("spice-default").unwrap();
        let drop = m.forward_drop_at(300.0);
        assert!(drop > 0.8 && drop < 0.87, "drop {drop}");
        for m in [m, DiodeData::DEFAULT, DiodeData::by_name("1N4004").unwrap()] {
            let drop = m.forward_drop_at(300.0);
            assert_relative_eq!(m.current_at(300.0, drop), 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_evaluation_stays_finite_far_from_operating_range() {
        for name in ["spice-default", "falstad-zener", "1N4004"] {
            let m = DiodeData::by_name(name).unwrap();
            for v in [100.0, 1e3, -1e3] {
                let g = m.conductance_at(300.0, v);
                assert!(g.is_finite() && g > 0.0, "{name}: conductance {g} at {v} V");
                let i = m.current_at(300.0, v);
                assert!(i.is_finite(), "{name}: current {i} at {v} V");
                assert!((i - g * v).is_finite());
            }
        }
    }

    #[test]
    fn test_zener_reverse_current_breaks_down() {
        let m = DiodeData::by_name("falstad-zener").unwrap();
        let before = m.current_at(300.0, -2.0);
        let after = m.current_at(300.0, -7.0);
        assert!(after < before);
        assert!(after.abs() > 1e-3);
    }

    #[test]
    fn test_ideal_diode_starts_blocking() {
        let d = IdealDiode::new();
        assert!(!d.is_conducting());
        assert_eq!(d.resistance(), d.max_resistance);
    }
}
