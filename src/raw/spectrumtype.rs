use super::datapoints::DataPointList;

/**
Describes the representation of the signal in a spectrum: intensity recorded
only at discrete peak apexes (`Centroided`) or sampled continuously across
closely spaced m/z bins (`Profile`).
*/
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Default)]
pub enum MsSpectrumType {
    #[default]
    Unknown = 0,
    Centroided = 3,
    Profile = 5,
}

/// Relative m/z tolerance used to decide whether two consecutive points are
/// part of the same sampled peak shape.
const NEIGHBOR_REL_TOL: f64 = 1.5e-3;
/// Absolute floor on the neighbor tolerance, in m/z.
const NEIGHBOR_ABS_TOL: f64 = 0.01;

/**
Classify a decoded point list as centroided or profile.

Profile spectra sample each peak with many closely and regularly spaced
points, so the most intense apexes sit next to nonzero neighbors within a
small m/z distance. Centroided spectra keep only the apexes themselves,
separated by large, irregular gaps. The classification takes a majority vote
across a representative set of the most intense local maxima rather than
inspecting only the base peak, so a single sparse region cannot flip the
answer.

Fewer than two points carry no shape information at all and always yield
[`MsSpectrumType::Unknown`].
*/
pub fn detect_spectrum_type(points: &DataPointList) -> MsSpectrumType {
    let mzs = points.mzs();
    let intensities = points.intensities();
    let n = mzs.len();
    if n < 2 {
        return MsSpectrumType::Unknown;
    }

    let span = mzs[n - 1] - mzs[0];
    if !(span > 0.0) {
        return MsSpectrumType::Unknown;
    }

    let mut apexes = local_maxima(mzs, intensities);
    if apexes.is_empty() {
        return MsSpectrumType::Unknown;
    }

    // Vote over the top ~5% of apexes, but never fewer than five, so small
    // spectra still get a full poll.
    apexes.sort_unstable_by(|a, b| {
        intensities[*b]
            .partial_cmp(&intensities[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let votes = apexes.len().min((apexes.len() / 20).max(5));

    let mut profile_votes = 0usize;
    for &i in apexes.iter().take(votes) {
        if has_flank(mzs, intensities, i) {
            profile_votes += 1;
        }
    }

    if profile_votes * 2 >= votes {
        MsSpectrumType::Profile
    } else {
        MsSpectrumType::Centroided
    }
}

/// Indices of points that are at least as intense as both neighbors and
/// carry signal. Endpoints count when they dominate their single neighbor.
fn local_maxima(mzs: &[f64], intensities: &[f32]) -> Vec<usize> {
    let n = mzs.len();
    let mut apexes = Vec::new();
    for i in 0..n {
        if intensities[i] <= 0.0 {
            continue;
        }
        let left_ok = i == 0 || intensities[i - 1] <= intensities[i];
        let right_ok = i + 1 == n || intensities[i + 1] <= intensities[i];
        if left_ok && right_ok {
            apexes.push(i);
        }
    }
    apexes
}

/// Does the apex at `i` have a nonzero-intensity neighbor close enough in
/// m/z to be part of the same sampled peak shape?
fn has_flank(mzs: &[f64], intensities: &[f32], i: usize) -> bool {
    let tol = mzs[i] * NEIGHBOR_REL_TOL + NEIGHBOR_ABS_TOL;
    if i > 0 && (mzs[i] - mzs[i - 1]) <= tol && intensities[i - 1] > 0.0 {
        return true;
    }
    if i + 1 < mzs.len() && (mzs[i + 1] - mzs[i]) <= tol && intensities[i + 1] > 0.0 {
        return true;
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_points(pairs: &[(f64, f32)]) -> DataPointList {
        let mut points = DataPointList::new();
        for (mz, intensity) in pairs.iter().copied() {
            points.push(mz, intensity);
        }
        points
    }

    /// A handful of isolated spikes with wide gaps.
    fn centroid_fixture() -> DataPointList {
        make_points(&[
            (100.0, 500.0),
            (200.0, 1500.0),
            (300.0, 350.0),
            (400.0, 4200.0),
            (500.0, 90.0),
        ])
    }

    /// Two gaussian-ish bumps sampled on a dense regular grid.
    fn profile_fixture() -> DataPointList {
        let mut points = DataPointList::new();
        for i in 0..200 {
            let mz = 400.0 + i as f64 * 0.01;
            let a = ((mz - 400.5) / 0.05_f64).powi(2);
            let b = ((mz - 401.3) / 0.04_f64).powi(2);
            let intensity = (1000.0 * (-a).exp() + 400.0 * (-b).exp()) as f32;
            points.push(mz, intensity);
        }
        points
    }

    #[test]
    fn test_centroid_detection() {
        assert_eq!(
            detect_spectrum_type(&centroid_fixture()),
            MsSpectrumType::Centroided
        );
    }

    #[test]
    fn test_profile_detection() {
        assert_eq!(
            detect_spectrum_type(&profile_fixture()),
            MsSpectrumType::Profile
        );
    }

    #[test]
    fn test_too_few_points() {
        assert_eq!(
            detect_spectrum_type(&DataPointList::new()),
            MsSpectrumType::Unknown
        );
        assert_eq!(
            detect_spectrum_type(&make_points(&[(500.0, 100.0)])),
            MsSpectrumType::Unknown
        );
    }

    #[test]
    fn test_degenerate_span() {
        let points = make_points(&[(500.0, 100.0), (500.0, 100.0)]);
        assert_eq!(detect_spectrum_type(&points), MsSpectrumType::Unknown);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let points = profile_fixture();
        let first = detect_spectrum_type(&points);
        let second = detect_spectrum_type(&points);
        assert_eq!(first, second);
    }
}
