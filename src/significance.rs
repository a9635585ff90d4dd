//! Recorded evaluation figures for the TREC-8 ad-hoc runs and the
//! significance test used to compare rankers. The per-topic average
//! precision arrays are regression data: the ranking formulas are
//! expected to keep reproducing runs with these characteristics.

/// Per-topic average precision of the cosine tf-idf run (50 topics).
pub const COSINE_TFIDF_AVERAGE_PRECISION: [f64; 50] = [
    0.0000, 0.0246, 0.3019, 0.0255, 0.0327, 0.1906, 0.2171, 0.0163, 0.0665, 0.5059, 0.1562,
    0.0000, 0.0010, 0.0364, 0.1935, 0.0329, 0.0002, 0.0741, 0.0159, 0.1804, 0.0009, 0.0075,
    0.6044, 0.0064, 0.0194, 0.0010, 0.1196, 0.0040, 0.2735, 0.2460, 0.0230, 0.0012, 0.1141,
    0.0207, 0.0024, 0.0038, 0.0208, 0.0006, 0.0023, 0.0072, 0.5003, 0.0117, 0.0051, 0.8960,
    0.0082, 0.0000, 0.2851, 0.0000, 0.0194, 0.0760,
];

/// Per-topic average precision of the BM25 run (50 topics).
pub const BM25_AVERAGE_PRECISION: [f64; 50] = [
    0.0003, 0.1239, 0.7406, 0.0539, 0.1004, 0.2036, 0.1129, 0.0771, 0.1516, 0.6045, 0.1375,
    0.0104, 0.0939, 0.1742, 0.2457, 0.2282, 0.1682, 0.0789, 0.0578, 0.3085, 0.0189, 0.1250,
    0.6263, 0.0386, 0.1952, 0.0025, 0.1550, 0.0277, 0.4234, 0.5660, 0.2207, 0.0064, 0.0027,
    0.1252, 0.0121, 0.0433, 0.0072, 0.0498, 0.0043, 0.0057, 0.4378, 0.0023, 0.0225, 0.4678,
    0.0912, 0.0084, 0.4698, 0.0116, 0.0467, 0.1196,
];

/// Per-topic average precision of the BM25-VA run (50 topics).
pub const BM25VA_AVERAGE_PRECISION: [f64; 50] = [
    0.0000, 0.1267, 0.6736, 0.0712, 0.1200, 0.2048, 0.1294, 0.0810, 0.1344, 0.5308, 0.1526,
    0.0169, 0.0810, 0.1294, 0.2517, 0.2212, 0.2048, 0.0973, 0.0580, 0.3126, 0.0402, 0.0997,
    0.6713, 0.0227, 0.1526, 0.0030, 0.1747, 0.0280, 0.3139, 0.5080, 0.2460, 0.0097, 0.0119,
    0.1203, 0.0156, 0.0336, 0.0089, 0.0617, 0.0033, 0.0093, 0.4746, 0.0128, 0.0281, 0.4112,
    0.0653, 0.0155, 0.2540, 0.0181, 0.0691, 0.0945,
];

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    (m, variance)
}

/// Welch's two-sample t-test (unequal variances). Returns the t
/// statistic and the Welch–Satterthwaite degrees of freedom.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> (f64, f64) {
    let (mean_a, var_a) = mean_and_variance(a);
    let (mean_b, var_b) = mean_and_variance(b);
    let na = a.len() as f64;
    let nb = b.len() as f64;

    let sa = var_a / na;
    let sb = var_b / nb;

    let t = (mean_a - mean_b) / (sa + sb).sqrt();
    let degrees_of_freedom =
        (sa + sb).powi(2) / (sa * sa / (na - 1.0) + sb * sb / (nb - 1.0));
    (t, degrees_of_freedom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_within_one_percent(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= expected * 0.01,
            "{} not within 1% of {}",
            actual,
            expected
        );
    }

    #[test]
    fn test_recorded_means_are_stable() {
        assert_within_one_percent(mean(&COSINE_TFIDF_AVERAGE_PRECISION), 0.107046);
        assert_within_one_percent(mean(&BM25_AVERAGE_PRECISION), 0.160116);
        assert_within_one_percent(mean(&BM25VA_AVERAGE_PRECISION), 0.1515);
    }

    #[test]
    fn test_welch_t_test_against_reference() {
        let (t, df) = welch_t_test(&COSINE_TFIDF_AVERAGE_PRECISION, &BM25_AVERAGE_PRECISION);
        assert!((t - -1.42817).abs() < 1e-4);
        assert!((df - 97.9014).abs() < 1e-3);

        let (t, _) = welch_t_test(&COSINE_TFIDF_AVERAGE_PRECISION, &BM25VA_AVERAGE_PRECISION);
        assert!((t - -1.25194).abs() < 1e-4);

        let (t, _) = welch_t_test(&BM25_AVERAGE_PRECISION, &BM25VA_AVERAGE_PRECISION);
        assert!((t - 0.23854).abs() < 1e-4);
    }

    #[test]
    fn test_welch_t_test_is_zero_for_identical_samples() {
        let (t, _) = welch_t_test(&BM25_AVERAGE_PRECISION, &BM25_AVERAGE_PRECISION);
        assert!(t.abs() < 1e-12);
    }
}
