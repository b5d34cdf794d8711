//! Statistical primitives for comparing experiment variants.
//!
//! Everything here is pure and deterministic (the bootstrap takes an
//! explicit seed). Closed-form distributions use the standard
//! Abramowitz & Stegun approximations; the Student-t tail goes through
//! the regularized incomplete beta function.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Arithmetic mean. Empty input yields 0.0.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator). Fewer than two values yield 0.0.
#[must_use]
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation.
#[must_use]
pub fn sample_std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Median via sorted copy.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Percentile in `[0, 100]` with linear interpolation between ranks.
#[must_use]
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Standard normal survival function P(Z > z).
///
/// Abramowitz & Stegun 26.2.17; absolute error below 7.5e-8.
#[must_use]
pub fn normal_sf(z: f64) -> f64 {
    if z < 0.0 {
        return 1.0 - normal_sf(-z);
    }
    let t = 1.0 / (1.0 + 0.2316419 * z);
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let pdf = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
    (pdf * poly).clamp(0.0, 1.0)
}

/// Two-tailed p-value from a standard normal statistic.
#[must_use]
pub fn normal_two_tailed_p(z: f64) -> f64 {
    (2.0 * normal_sf(z.abs())).clamp(0.0, 1.0)
}

/// Upper-tail critical value z with P(Z > z) = p, for p in (0, 1).
///
/// Abramowitz & Stegun 26.2.23 rational approximation; absolute error
/// below 4.5e-4, plenty for sample-size planning.
#[must_use]
pub fn z_from_p(p: f64) -> f64 {
    let p = p.clamp(1e-12, 1.0 - 1e-12);
    if p > 0.5 {
        return -z_from_p(1.0 - p);
    }
    let t = (-2.0 * p.ln()).sqrt();
    let num = 2.515517 + t * (0.802853 + t * 0.010328);
    let den = 1.0 + t * (1.432788 + t * (0.189269 + t * 0.001308));
    t - num / den
}

/// ln Γ(x) via the Lanczos approximation.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_7e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for c in COEFFS {
        y += 1.0;
        series += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Regularized incomplete beta function I_x(a, b), by continued fraction.
#[must_use]
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // The continued fraction converges fastest for x < (a+1)/(a+b+2);
    // otherwise use the symmetry relation.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - regularized_incomplete_beta(b, a, 1.0 - x)
    }
}

/// Lentz's method for the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3.0e-14;
    const TINY: f64 = 1.0e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Two-tailed p-value for a Student-t statistic with `df` degrees of
/// freedom. Falls back to the normal approximation for large df, where
/// the distributions are indistinguishable.
#[must_use]
pub fn students_t_two_tailed_p(t: f64, df: f64) -> f64 {
    if df <= 0.0 || !t.is_finite() {
        return 1.0;
    }
    if df > 200.0 {
        return normal_two_tailed_p(t);
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Outcome of a two-sample location test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test statistic (t, z, or the bootstrap mean difference)
    pub statistic: f64,

    /// Degrees of freedom where the test has one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub degrees_of_freedom: Option<f64>,

    /// Two-tailed p-value
    pub p_value: f64,
}

/// Welch's unequal-variance t-test with Welch-Satterthwaite df.
#[must_use]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> TestOutcome {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.len() < 2 || b.len() < 2 {
        return TestOutcome {
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
        };
    }
    let (va, vb) = (sample_variance(a), sample_variance(b));
    let se2 = va / na + vb / nb;
    if se2 <= 0.0 {
        // Identical constant samples: no evidence of a difference.
        return TestOutcome {
            statistic: 0.0,
            degrees_of_freedom: Some(na + nb - 2.0),
            p_value: 1.0,
        };
    }
    let t = (mean(a) - mean(b)) / se2.sqrt();
    let df = se2 * se2
        / ((va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0));
    TestOutcome {
        statistic: t,
        degrees_of_freedom: Some(df),
        p_value: students_t_two_tailed_p(t, df),
    }
}

/// Pooled-variance Student's t-test (assumes equal variances).
#[must_use]
pub fn student_t_test(a: &[f64], b: &[f64]) -> TestOutcome {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.len() < 2 || b.len() < 2 {
        return TestOutcome {
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
        };
    }
    let df = na + nb - 2.0;
    let pooled = ((na - 1.0) * sample_variance(a) + (nb - 1.0) * sample_variance(b)) / df;
    let se = (pooled * (1.0 / na + 1.0 / nb)).sqrt();
    if se <= 0.0 {
        return TestOutcome {
            statistic: 0.0,
            degrees_of_freedom: Some(df),
            p_value: 1.0,
        };
    }
    let t = (mean(a) - mean(b)) / se;
    TestOutcome {
        statistic: t,
        degrees_of_freedom: Some(df),
        p_value: students_t_two_tailed_p(t, df),
    }
}

/// Mann-Whitney U test via the tie-corrected normal approximation.
#[must_use]
pub fn mann_whitney_u_test(a: &[f64], b: &[f64]) -> TestOutcome {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.is_empty() || b.is_empty() {
        return TestOutcome {
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
        };
    }

    // Rank the pooled sample, averaging ranks within tie groups.
    let mut pooled: Vec<(f64, usize)> = a
        .iter()
        .map(|&v| (v, 0usize))
        .chain(b.iter().map(|&v| (v, 1usize)))
        .collect();
    pooled.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = pooled.len();
    let mut ranks = vec![0.0; n];
    let mut tie_correction = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for rank in ranks.iter_mut().take(j + 1).skip(i) {
            *rank = avg_rank;
        }
        let ties = (j - i + 1) as f64;
        tie_correction += ties * ties * ties - ties;
        i = j + 1;
    }

    let rank_sum_a: f64 = pooled
        .iter()
        .zip(&ranks)
        .filter(|((_, group), _)| *group == 0)
        .map(|(_, r)| r)
        .sum();
    let u_a = rank_sum_a - na * (na + 1.0) / 2.0;
    let u = u_a.min(na * nb - u_a);

    let mean_u = na * nb / 2.0;
    let n_total = na + nb;
    let variance = na * nb / 12.0
        * ((n_total + 1.0) - tie_correction / (n_total * (n_total - 1.0)));
    if variance <= 0.0 {
        return TestOutcome {
            statistic: 0.0,
            degrees_of_freedom: None,
            p_value: 1.0,
        };
    }
    // Continuity correction toward the mean.
    let z = (u - mean_u + 0.5) / variance.sqrt();
    TestOutcome {
        statistic: z,
        degrees_of_freedom: None,
        p_value: normal_two_tailed_p(z),
    }
}

/// Seeded bootstrap test on the difference of means: resamples both
/// groups with replacement and reports the two-tailed fraction of
/// resampled differences on the wrong side of zero.
#[must_use]
pub fn bootstrap_mean_diff_test(a: &[f64], b: &[f64], iterations: usize, seed: u64) -> TestOutcome {
    let observed = mean(a) - mean(b);
    if a.is_empty() || b.is_empty() || iterations == 0 {
        return TestOutcome {
            statistic: observed,
            degrees_of_freedom: None,
            p_value: 1.0,
        };
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut le_zero = 0usize;
    let mut ge_zero = 0usize;
    for _ in 0..iterations {
        let ma = resample_mean(a, &mut rng);
        let mb = resample_mean(b, &mut rng);
        let diff = ma - mb;
        if diff <= 0.0 {
            le_zero += 1;
        }
        if diff >= 0.0 {
            ge_zero += 1;
        }
    }
    let frac = le_zero.min(ge_zero) as f64 / iterations as f64;
    TestOutcome {
        statistic: observed,
        degrees_of_freedom: None,
        p_value: (2.0 * frac).clamp(0.0, 1.0),
    }
}

/// Seeded bootstrap percentile confidence interval for the mean at
/// level `1 - alpha`.
#[must_use]
pub fn bootstrap_mean_ci(values: &[f64], iterations: usize, alpha: f64, seed: u64) -> (f64, f64) {
    if values.is_empty() || iterations == 0 {
        return (0.0, 0.0);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let means: Vec<f64> = (0..iterations).map(|_| resample_mean(values, &mut rng)).collect();
    let half = alpha / 2.0 * 100.0;
    (percentile(&means, half), percentile(&means, 100.0 - half))
}

fn resample_mean(values: &[f64], rng: &mut StdRng) -> f64 {
    let n = values.len();
    let sum: f64 = (0..n).map(|_| values[rng.gen_range(0..n)]).sum();
    sum / n as f64
}

/// Conventional effect magnitude buckets for Cohen's d.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMagnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectMagnitude {
    /// Bucket an absolute Cohen's d (0.2 / 0.5 / 0.8 thresholds).
    #[must_use]
    pub fn from_cohens_d(d: f64) -> Self {
        let d = d.abs();
        if d < 0.2 {
            Self::Negligible
        } else if d < 0.5 {
            Self::Small
        } else if d < 0.8 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

/// Cohen's d with pooled standard deviation. Zero pooled variance
/// yields 0.0 (identical constant samples have no effect to size).
#[must_use]
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }
    let pooled_var =
        ((na - 1.0) * sample_variance(a) + (nb - 1.0) * sample_variance(b)) / (na + nb - 2.0);
    if pooled_var <= 0.0 {
        return 0.0;
    }
    (mean(a) - mean(b)) / pooled_var.sqrt()
}

/// Cliff's delta: P(a > b) - P(a < b) over all pairs, in `[-1, 1]`.
#[must_use]
pub fn cliffs_delta(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut greater = 0i64;
    let mut less = 0i64;
    for &x in a {
        for &y in b {
            if x > y {
                greater += 1;
            } else if x < y {
                less += 1;
            }
        }
    }
    (greater - less) as f64 / (a.len() * b.len()) as f64
}

/// Multiple-testing corrections over a family of p-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleTestingCorrection {
    /// No correction
    None,
    /// Bonferroni: p * m, capped at 1
    Bonferroni,
    /// Holm step-down (default: uniformly more powerful than Bonferroni)
    #[default]
    Holm,
}

/// Adjust a family of p-values. Output order matches input order.
#[must_use]
pub fn adjust_p_values(p_values: &[f64], correction: MultipleTestingCorrection) -> Vec<f64> {
    let m = p_values.len();
    match correction {
        MultipleTestingCorrection::None => p_values.to_vec(),
        MultipleTestingCorrection::Bonferroni => p_values
            .iter()
            .map(|p| (p * m as f64).clamp(0.0, 1.0))
            .collect(),
        MultipleTestingCorrection::Holm => {
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by(|&i, &j| {
                p_values[i]
                    .partial_cmp(&p_values[j])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut adjusted = vec![0.0; m];
            let mut running_max: f64 = 0.0;
            for (rank, &idx) in order.iter().enumerate() {
                let scaled = ((m - rank) as f64 * p_values[idx]).clamp(0.0, 1.0);
                running_max = running_max.max(scaled);
                adjusted[idx] = running_max;
            }
            adjusted
        }
    }
}

/// Per-group sample size needed to detect `effect_size` (Cohen's d) at
/// two-tailed significance `alpha` with the given power.
#[must_use]
pub fn required_sample_size(effect_size: f64, alpha: f64, power: f64) -> usize {
    if effect_size.abs() < 1e-9 {
        return usize::MAX;
    }
    let z_alpha = z_from_p(alpha / 2.0);
    let z_beta = z_from_p(1.0 - power);
    let n = 2.0 * ((z_alpha + z_beta) / effect_size).powi(2);
    n.ceil().max(2.0) as usize
}
