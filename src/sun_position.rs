use crate::types::{GeoMoment, PlacementError, SolarPosition};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Astronomical lookup: where the sun is for a place and instant.
pub trait SolarEphemeris: Send + Sync {
    fn position(&self, moment: &GeoMoment) -> Result<SolarPosition, PlacementError>;
}

/// Low-precision solar almanac (roughly 0.5 degree accuracy), good enough
/// for choosing a panel direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SunCalculator;

impl SunCalculator {
    pub fn new() -> Self {
        Self
    }

    fn calculate_position(&self, latitude: f64, longitude: f64, datetime: &DateTime<Utc>) -> (f64, f64) {
        let julian_day = self.julian_day(datetime);
        let (declination, equation_of_time) = self.almanac(julian_day);

        let solar_time = self.solar_time(datetime, equation_of_time, longitude);
        let hour_angle = wrap_signed(15.0 * (solar_time - 12.0));

        let lat_rad = latitude.to_radians();
        let dec_rad = declination.to_radians();
        let hour_rad = hour_angle.to_radians();

        let elevation = (lat_rad.sin() * dec_rad.sin()
            + lat_rad.cos() * dec_rad.cos() * hour_rad.cos())
        .clamp(-1.0, 1.0)
        .asin();

        // Undefined with the sun at the zenith; report north.
        let cos_elevation = elevation.cos();
        let azimuth = if cos_elevation.abs() < 1e-12 {
            0.0
        } else {
            ((dec_rad.sin() * lat_rad.cos() - dec_rad.cos() * lat_rad.sin() * hour_rad.cos())
                / cos_elevation)
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees()
        };

        let azimuth_deg = if hour_angle > 0.0 {
            360.0 - azimuth
        } else {
            azimuth
        };

        (azimuth_deg.rem_euclid(360.0), elevation.to_degrees())
    }

    fn julian_day(&self, datetime: &DateTime<Utc>) -> f64 {
        let a = (14 - datetime.month() as i32) / 12;
        let y = datetime.year() + 4800 - a;
        let m = datetime.month() as i32 + 12 * a - 3;

        let day_number = datetime.day() as f64 + (153 * m + 2) as f64 / 5.0 + 365.0 * y as f64
            + (y / 4) as f64
            - (y / 100) as f64
            + (y / 400) as f64
            - 32045.0;

        // Day number refers to noon; add the UT fraction.
        let seconds = datetime.num_seconds_from_midnight() as f64;
        day_number.floor() + (seconds / 3600.0 - 12.0) / 24.0
    }

    /// Declination (degrees) and equation of time (minutes).
    fn almanac(&self, julian_day: f64) -> (f64, f64) {
        let n = julian_day - 2451545.0;
        let l = (280.460 + 0.9856474 * n).rem_euclid(360.0);
        let g = (357.528 + 0.9856003 * n).rem_euclid(360.0).to_radians();
        let lambda = (l + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
        let obliquity = (23.439 - 0.0000004 * n).to_radians();

        let declination = (obliquity.sin() * lambda.sin()).asin().to_degrees();
        let right_ascension = (obliquity.cos() * lambda.sin())
            .atan2(lambda.cos())
            .to_degrees();

        let equation_of_time = 4.0 * wrap_signed(l - 0.0057183 - right_ascension);
        (declination, equation_of_time)
    }

    fn solar_time(&self, datetime: &DateTime<Utc>, equation_of_time: f64, longitude: f64) -> f64 {
        let utc_hours = datetime.hour() as f64
            + datetime.minute() as f64 / 60.0
            + datetime.second() as f64 / 3600.0;
        utc_hours + equation_of_time / 60.0 + longitude / 15.0
    }
}

impl SolarEphemeris for SunCalculator {
    fn position(&self, moment: &GeoMoment) -> Result<SolarPosition, PlacementError> {
        let (azimuth, elevation) =
            self.calculate_position(moment.latitude(), moment.longitude(), &moment.instant());

        if !azimuth.is_finite() || !elevation.is_finite() {
            return Err(PlacementError::Ephemeris(format!(
                "non-finite sun position for ({}, {}) at {}",
                moment.latitude(),
                moment.longitude(),
                moment.instant().to_rfc3339()
            )));
        }

        Ok(SolarPosition {
            altitude_deg: elevation,
            azimuth_deg: azimuth,
        })
    }
}

/// Ephemeris returning a preset position, for callers that already have
/// altitude/azimuth and for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedEphemeris {
    position: SolarPosition,
}

impl FixedEphemeris {
    pub fn new(altitude_deg: f64, azimuth_deg: f64) -> Self {
        Self {
            position: SolarPosition {
                altitude_deg,
                azimuth_deg,
            },
        }
    }
}

impl SolarEphemeris for FixedEphemeris {
    fn position(&self, _moment: &GeoMoment) -> Result<SolarPosition, PlacementError> {
        Ok(self.position)
    }
}

/// Wraps degrees into (-180, 180].
fn wrap_signed(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(lat: f64, lon: f64, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> SolarPosition {
        let instant = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap();
        let moment = GeoMoment::new(lat, lon, Some(instant)).unwrap();
        SunCalculator::new().position(&moment).unwrap()
    }

    #[test]
    fn equinox_noon_at_equator_is_near_zenith() {
        let pos = at(0.0, 0.0, 2024, 3, 20, 12, 0);
        assert!(pos.altitude_deg > 85.0, "altitude {}", pos.altitude_deg);
    }

    #[test]
    fn midnight_is_below_horizon() {
        let pos = at(0.0, 0.0, 2024, 3, 20, 0, 0);
        assert!(pos.altitude_deg < -80.0, "altitude {}", pos.altitude_deg);
        assert!(!pos.is_above_horizon());
    }

    #[test]
    fn northern_summer_noon_faces_south() {
        let pos = at(40.0, 0.0, 2024, 6, 21, 12, 0);
        assert!((70.0..77.0).contains(&pos.altitude_deg), "altitude {}", pos.altitude_deg);
        assert!((170.0..190.0).contains(&pos.azimuth_deg), "azimuth {}", pos.azimuth_deg);
    }

    #[test]
    fn northern_summer_morning_faces_east() {
        let pos = at(40.0, 0.0, 2024, 6, 21, 7, 0);
        assert!((60.0..110.0).contains(&pos.azimuth_deg), "azimuth {}", pos.azimuth_deg);
        assert!(pos.is_above_horizon());
    }

    #[test]
    fn southern_winter_noon_faces_north() {
        // Cape Town, local solar noon is ~10:46 UT
        let pos = at(-33.9, 18.4, 2024, 6, 21, 10, 46);
        assert!(pos.azimuth_deg < 15.0 || pos.azimuth_deg > 345.0, "azimuth {}", pos.azimuth_deg);
        assert!((28.0..38.0).contains(&pos.altitude_deg), "altitude {}", pos.altitude_deg);
    }

    #[test]
    fn azimuth_stays_in_range() {
        for lon in [-180.0, -122.0, 0.0, 77.2, 170.0, 180.0] {
            for hour in 0..24 {
                let pos = at(51.5, lon, 2024, 12, 1, hour, 30);
                assert!((0.0..360.0).contains(&pos.azimuth_deg), "azimuth {}", pos.azimuth_deg);
                assert!((-90.0..=90.0).contains(&pos.altitude_deg));
            }
        }
    }

    #[test]
    fn fixed_ephemeris_ignores_moment() {
        let moment = GeoMoment::new(10.0, 10.0, None).unwrap();
        let pos = FixedEphemeris::new(50.0, 200.0).position(&moment).unwrap();
        assert_eq!(pos.altitude_deg, 50.0);
        assert_eq!(pos.azimuth_deg, 200.0);
    }

    #[test]
    fn wrap_signed_range() {
        assert_eq!(wrap_signed(190.0), -170.0);
        assert_eq!(wrap_signed(-190.0), 170.0);
        assert_eq!(wrap_signed(180.0), 180.0);
    }
}
