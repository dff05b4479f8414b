use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const CF_MAX_ITER: usize = 100_000;
const CF_EPS: f64 = 1e-15;
const CF_TINY: f64 = 1e-300;

/// Natural log of the gamma function (Lanczos approximation).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection formula
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut a = LANCZOS[0];
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }

    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < CF_TINY {
        d = CF_TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=CF_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < CF_TINY {
            d = CF_TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < CF_TINY {
            c = CF_TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < CF_TINY {
            d = CF_TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < CF_TINY {
            c = CF_TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPS {
            break;
        }
    }

    h
}

/// Regularized incomplete beta function I_x(a, b).
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Upper tail of the binomial distribution, P(X > x) for X ~ Binomial(n, p).
pub fn binomial_survival(x: u64, p: f64, n: u64) -> f64 {
    if x >= n || p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    incomplete_beta(x as f64 + 1.0, (n - x) as f64, p)
}

/// Lower tail of the binomial distribution, P(X <= x) for X ~ Binomial(n, p).
pub fn binomial_cdf(x: u64, p: f64, n: u64) -> f64 {
    if x >= n || p <= 0.0 {
        return 1.0;
    }
    if p >= 1.0 {
        return 0.0;
    }

    incomplete_beta((n - x) as f64, x as f64 + 1.0, 1.0 - p)
}

/// Smallest x in [0, n] with P(X <= x) > q, or n if there is none.
pub fn binomial_quantile(q: f64, p: f64, n: u64) -> u64 {
    let (mut lo, mut hi) = (0, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if binomial_cdf(mid, p, n) > q {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    lo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_cdf(x: u64, p: f64, n: u64) -> f64 {
        let mut total = 0.0;
        for i in 0..=x.min(n) {
            let ln_choose = ln_gamma(n as f64 + 1.0)
                - ln_gamma(i as f64 + 1.0)
                - ln_gamma((n - i) as f64 + 1.0);
            total += (ln_choose + i as f64 * p.ln() + (n - i) as f64 * (1.0 - p).ln()).exp();
        }
        total
    }

    #[test]
    fn test_ln_gamma() {
        assert!((ln_gamma(1.0)).abs() < 1e-12);
        assert!((ln_gamma(2.0)).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-12);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-12);
        assert!((ln_gamma(101.0) - 363.739_375_555_563_5).abs() < 1e-8);
    }

    #[test]
    fn test_binomial_fair_coin() {
        // P(X <= 4) for n = 10, p = 0.5 is 386 / 1024
        assert!((binomial_cdf(4, 0.5, 10) - 386.0 / 1024.0).abs() < 1e-12);
        assert!((binomial_survival(4, 0.5, 10) - 638.0 / 1024.0).abs() < 1e-12);
        assert!((binomial_survival(9, 0.5, 10) - 1.0 / 1024.0).abs() < 1e-14);
    }

    #[test]
    fn test_binomial_matches_sum() {
        for &(x, p, n) in &[(3u64, 0.1, 50u64), (20, 0.3, 100), (0, 0.01, 1000), (7, 0.9, 8)] {
            let expected = exact_cdf(x, p, n);
            assert!(
                (binomial_cdf(x, p, n) - expected).abs() < 1e-10,
                "cdf({}, {}, {})",
                x,
                p,
                n
            );
            assert!((binomial_survival(x, p, n) - (1.0 - expected)).abs() < 1e-10);
        }
    }

    #[test]
    fn test_binomial_edges() {
        assert_eq!(binomial_survival(10, 0.5, 10), 0.0);
        assert_eq!(binomial_survival(0, 0.0, 10), 0.0);
        assert_eq!(binomial_survival(0, 1.0, 10), 1.0);
        assert_eq!(binomial_cdf(10, 0.3, 10), 1.0);
        assert_eq!(binomial_cdf(3, 1.0, 10), 0.0);

        // tiny tails stay positive rather than cancelling to zero
        let tail = binomial_survival(99, 1e-4, 1000);
        assert!(tail > 0.0 && tail < 1e-100);
    }

    #[test]
    fn test_binomial_quantile() {
        assert_eq!(binomial_quantile(0.005, 0.5, 10), 1);
        assert_eq!(binomial_quantile(0.5, 0.5, 10), 5);
        assert_eq!(binomial_quantile(1.0, 0.5, 10), 10);
    }
}
