//! Built-in unit catalog
//!
//! Each unit maps linearly onto the base unit of its dimension:
//! `base = (value + zero) * scale`. Only temperatures carry a `zero` offset.

use crate::types::normalize_unit_name;

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Length,
    Mass,
    Time,
    Volume,
    Area,
    Speed,
    Temperature,
    DataSize,
    Energy,
    Pressure,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    /// Canonical formula symbol
    pub name: &'static str,
    pub dimension: Dimension,
    pub scale: f64,
    pub zero: f64,
    /// Quantities of this unit are never negative
    pub non_negative: bool,
    pub aliases: &'static [&'static str],
}

impl UnitDef {
    /// Human-readable name, e.g. `square feet`
    pub fn display_name(&self) -> String {
        self.name.replace('_', " ")
    }
}

const fn unit(
    name: &'static str,
    dimension: Dimension,
    scale: f64,
    aliases: &'static [&'static str],
) -> UnitDef {
    UnitDef {
        name,
        dimension,
        scale,
        zero: 0.0,
        non_negative: true,
        aliases,
    }
}

const fn signed(
    name: &'static str,
    dimension: Dimension,
    scale: f64,
    zero: f64,
    aliases: &'static [&'static str],
) -> UnitDef {
    UnitDef {
        name,
        dimension,
        scale,
        zero,
        non_negative: false,
        aliases,
    }
}

use Dimension::*;

static UNITS: &[UnitDef] = &[
    // Length (meters)
    unit("millimeters", Length, 0.001, &["millimeter", "millimetre", "millimetres", "mm"]),
    unit("centimeters", Length, 0.01, &["centimeter", "centimetre", "centimetres", "cm"]),
    unit("meters", Length, 1.0, &["meter", "metre", "metres", "m"]),
    unit("kilometers", Length, 1000.0, &["kilometer", "kilometre", "kilometres", "km"]),
    unit("inches", Length, 0.0254, &["inch", "in"]),
    unit("feet", Length, 0.3048, &["foot", "ft"]),
    unit("yards", Length, 0.9144, &["yard", "yd"]),
    unit("miles", Length, 1609.344, &["mile", "mi"]),
    unit("nautical_miles", Length, 1852.0, &["nautical_mile", "nmi"]),
    // Mass (kilograms)
    unit("milligrams", Mass, 1e-6, &["milligram", "mg"]),
    unit("grams", Mass, 0.001, &["gram", "g"]),
    unit("kilograms", Mass, 1.0, &["kilogram", "kg", "kilos", "kilo"]),
    unit("tonnes", Mass, 1000.0, &["tonne", "metric_tons", "metric_ton", "t"]),
    unit("ounces", Mass, 0.028349523125, &["ounce", "oz"]),
    unit("pounds", Mass, 0.45359237, &["pound", "lb", "lbs"]),
    unit("stones", Mass, 6.35029318, &["stone", "st"]),
    // Time (seconds)
    unit("milliseconds", Time, 0.001, &["millisecond", "ms"]),
    unit("seconds", Time, 1.0, &["second", "sec", "secs", "s"]),
    unit("minutes", Time, 60.0, &["minute", "min", "mins"]),
    unit("hours", Time, 3600.0, &["hour", "hr", "hrs", "h"]),
    unit("days", Time, 86400.0, &["day", "d"]),
    unit("weeks", Time, 604800.0, &["week", "wk"]),
    // Volume (liters)
    unit("milliliters", Volume, 0.001, &["milliliter", "millilitre", "millilitres", "ml"]),
    unit("liters", Volume, 1.0, &["liter", "litre", "litres", "l"]),
    unit("cubic_meters", Volume, 1000.0, &["cubic_meter", "cubic_metre", "cubic_metres", "m3"]),
    unit("teaspoons", Volume, 0.00492892159375, &["teaspoon", "tsp"]),
    unit("tablespoons", Volume, 0.01478676478125, &["tablespoon", "tbsp"]),
    unit("cups", Volume, 0.2365882365, &["cup"]),
    unit("pints", Volume, 0.473176473, &["pint", "pt"]),
    unit("quarts", Volume, 0.946352946, &["quart", "qt"]),
    unit("gallons", Volume, 3.785411784, &["gallon", "gal"]),
    // Area (square meters)
    unit("square_centimeters", Area, 1e-4, &["square_centimeter", "cm2"]),
    unit("square_meters", Area, 1.0, &["square_meter", "square_metre", "square_metres", "m2"]),
    unit("square_kilometers", Area, 1e6, &["square_kilometer", "km2"]),
    unit("square_inches", Area, 0.00064516, &["square_inch", "in2"]),
    unit("square_feet", Area, 0.09290304, &["square_foot", "ft2"]),
    unit("acres", Area, 4046.8564224, &["acre"]),
    unit("hectares", Area, 10000.0, &["hectare", "ha"]),
    unit("square_miles", Area, 2589988.110336, &["square_mile", "mi2"]),
    // Speed (meters per second)
    signed("meters_per_second", Speed, 1.0, 0.0, &["meter_per_second", "m/s"]),
    signed("kilometers_per_hour", Speed, 1.0 / 3.6, 0.0, &["kilometer_per_hour", "km/h", "kph"]),
    signed("miles_per_hour", Speed, 0.44704, 0.0, &["mile_per_hour", "mph"]),
    signed("feet_per_second", Speed, 0.3048, 0.0, &["foot_per_second", "ft/s", "fps"]),
    signed("knots", Speed, 1852.0 / 3600.0, 0.0, &["knot", "kn", "kt"]),
    // Temperature (kelvin)
    signed("celsius", Temperature, 1.0, 273.15, &["degrees_celsius", "degree_celsius", "centigrade", "°c"]),
    signed("fahrenheit", Temperature, 5.0 / 9.0, 459.67, &["degrees_fahrenheit", "degree_fahrenheit", "°f"]),
    unit("kelvin", Temperature, 1.0, &["kelvins", "k"]),
    unit("rankine", Temperature, 5.0 / 9.0, &["degrees_rankine", "°r"]),
    // Data size (bytes)
    unit("bits", DataSize, 0.125, &["bit"]),
    unit("bytes", DataSize, 1.0, &["byte", "b"]),
    unit("kilobytes", DataSize, 1e3, &["kilobyte", "kb"]),
    unit("megabytes", DataSize, 1e6, &["megabyte", "mb"]),
    unit("gigabytes", DataSize, 1e9, &["gigabyte", "gb"]),
    unit("terabytes", DataSize, 1e12, &["terabyte", "tb"]),
    unit("kibibytes", DataSize, 1024.0, &["kibibyte", "kib"]),
    unit("mebibytes", DataSize, 1048576.0, &["mebibyte", "mib"]),
    unit("gibibytes", DataSize, 1073741824.0, &["gibibyte", "gib"]),
    // Energy (joules)
    unit("joules", Energy, 1.0, &["joule", "j"]),
    unit("kilojoules", Energy, 1000.0, &["kilojoule", "kj"]),
    unit("calories", Energy, 4.184, &["calorie", "cal"]),
    unit("kilocalories", Energy, 4184.0, &["kilocalorie", "kcal"]),
    unit("watt_hours", Energy, 3600.0, &["watt_hour", "wh"]),
    unit("kilowatt_hours", Energy, 3.6e6, &["kilowatt_hour", "kwh"]),
    unit("british_thermal_units", Energy, 1055.05585262, &["british_thermal_unit", "btu", "btus"]),
    // Pressure (pascals)
    unit("pascals", Pressure, 1.0, &["pascal", "pa"]),
    unit("kilopascals", Pressure, 1000.0, &["kilopascal", "kpa"]),
    unit("bars", Pressure, 1e5, &["bar"]),
    unit("atmospheres", Pressure, 101325.0, &["atmosphere", "atm"]),
    unit("pounds_per_square_inch", Pressure, 6894.757293168, &["pound_per_square_inch", "psi"]),
    unit("millimeters_of_mercury", Pressure, 133.322387415, &["millimeter_of_mercury", "mmhg"]),
];

/// Every catalog unit
pub fn units() -> &'static [UnitDef] {
    UNITS
}

/// Find a unit by canonical name or alias, ignoring case and spacing
pub fn resolve(name: &str) -> Option<&'static UnitDef> {
    let key = normalize_unit_name(&name.replace('-', " "));
    UNITS
        .iter()
        .find(|u| u.name == key || u.aliases.iter().any(|alias| *alias == key))
}

/// The affine map `to = from * factor + offset` between two units of one dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub from: &'static UnitDef,
    pub to: &'static UnitDef,
    pub factor: f64,
    pub offset: f64,
}

impl Conversion {
    pub fn between(from: &'static UnitDef, to: &'static UnitDef) -> Option<Self> {
        if from.dimension != to.dimension {
            return None;
        }
        let factor = tidy(from.scale / to.scale);
        let offset = tidy(from.zero * from.scale / to.scale - to.zero);
        Some(Self {
            from,
            to,
            factor,
            offset,
        })
    }

    pub fn is_offset(&self) -> bool {
        self.offset != 0.0
    }

    /// Divisor to print instead of a fractional factor, when it is a whole number
    pub fn divisor(&self) -> Option<f64> {
        if self.factor >= 1.0 || self.factor <= 0.0 {
            return None;
        }
        let inverse = tidy(1.0 / self.factor);
        (inverse.fract() == 0.0).then_some(inverse)
    }

    /// Convert a value, using the same arithmetic the printed formula performs
    pub fn apply(&self, value: f64) -> f64 {
        let scaled = match self.divisor() {
            Some(divisor) => value / divisor,
            None => value * self.factor,
        };
        scaled + self.offset
    }

    /// Input whose converted value is exactly zero
    pub fn zero_point(&self) -> f64 {
        tidy(-self.offset / self.factor)
    }
}

/// Snap away floating-point noise of a few ulps, e.g. `1.7999999999999998` to `1.8`
fn tidy(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value + 0.0;
    }
    let rounded: f64 = format!("{:.11e}", value).parse().unwrap_or(value);
    if (rounded - value).abs() <= 64.0 * f64::EPSILON * value.abs() {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversion(from: &str, to: &str) -> Conversion {
        Conversion::between(resolve(from).unwrap(), resolve(to).unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_aliases() {
        assert_eq!(resolve("Meter").unwrap().name, "meters");
        assert_eq!(resolve("km/h").unwrap().name, "kilometers_per_hour");
        assert_eq!(resolve("kilometers per hour").unwrap().name, "kilometers_per_hour");
        assert_eq!(resolve("degrees Celsius").unwrap().name, "celsius");
        assert_eq!(resolve("square-feet").unwrap().name, "square_feet");
        assert!(resolve("furlongs per fortnight").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for unit in units() {
            assert!(seen.insert(unit.name), "duplicate {}", unit.name);
            for alias in unit.aliases {
                assert!(seen.insert(*alias), "duplicate alias {}", alias);
            }
        }
    }

    #[test]
    fn test_cross_dimension_is_none() {
        assert!(Conversion::between(resolve("meters").unwrap(), resolve("grams").unwrap()).is_none());
    }

    #[test]
    fn test_scale_conversion() {
        let c = conversion("meters", "centimeters");
        assert_eq!(c.factor, 100.0);
        assert_eq!(c.apply(2.5), 250.0);

        let c = conversion("centimeters", "meters");
        assert_eq!(c.divisor(), Some(100.0));
        assert_eq!(c.apply(250.0), 2.5);
    }

    #[test]
    fn test_temperature_conversion() {
        let c = conversion("celsius", "fahrenheit");
        assert_eq!(c.factor, 1.8);
        assert_eq!(c.offset, 32.0);
        assert!((c.zero_point() + 160.0 / 9.0).abs() < 1e-12);
        assert!((c.apply(100.0) - 212.0).abs() < 1e-9);

        let c = conversion("kelvin", "celsius");
        assert_eq!(c.offset, -273.15);
        assert_eq!(c.zero_point(), 273.15);
    }

    #[test]
    fn test_tidy() {
        assert_eq!(tidy(1.7999999999999998), 1.8);
        assert_eq!(tidy(1.0 / 3.0), 1.0 / 3.0);
        assert_eq!(tidy(-0.0).to_bits(), 0.0_f64.to_bits());
    }
}
