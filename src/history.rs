// Historical sample corpus for backtests
// Rows carry the four model features plus the observed default label.
//
// CSV layout (header required):
//   income,fico,dti,loan_amnt,default
// with default in {0, 1}.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, Result};
use crate::scoring::{sigmoid, ApplicantFeatures};

/// One past loan with a known outcome. Only exists in the backtest corpus;
/// live applications never carry a label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalApplication {
    pub income: f64,
    pub fico: f64,
    pub dti: f64,
    pub loan_amount: f64,
    pub defaulted: bool,
}

impl HistoricalApplication {
    pub fn features(&self) -> ApplicantFeatures {
        ApplicantFeatures {
            income: self.income,
            fico: self.fico,
            dti: self.dti,
            loan_amount: self.loan_amount,
        }
    }

    /// Realized profit had the loan been granted: interest if repaid, the
    /// whole principal lost if not.
    pub fn realized_profit(&self, interest_rate: f64) -> f64 {
        if self.defaulted {
            -self.loan_amount
        } else {
            self.loan_amount * interest_rate
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    income: f64,
    fico: f64,
    dti: f64,
    loan_amnt: f64,
    default: u8,
}

impl TryFrom<CsvRow> for HistoricalApplication {
    type Error = String;

    fn try_from(row: CsvRow) -> std::result::Result<Self, Self::Error> {
        let defaulted = match row.default {
            0 => false,
            1 => true,
            other => return Err(format!("default label must be 0 or 1, got {other}")),
        };

        Ok(HistoricalApplication {
            income: row.income,
            fico: row.fico,
            dti: row.dti,
            loan_amount: row.loan_amnt,
            defaulted,
        })
    }
}

impl From<&HistoricalApplication> for CsvRow {
    fn from(app: &HistoricalApplication) -> Self {
        CsvRow {
            income: app.income,
            fico: app.fico,
            dti: app.dti,
            loan_amnt: app.loan_amount,
            default: u8::from(app.defaulted),
        }
    }
}

/// Read the whole corpus. A missing or malformed file means there is no
/// backtest to run, so every failure is `SimulationUnavailable`.
pub fn load_sample(path: &Path) -> Result<Vec<HistoricalApplication>> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| {
        LendingError::simulation(format!("cannot open historical sample {}: {e}", path.display()))
    })?;

    let mut corpus = Vec::new();

    for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let row = result.map_err(|e| {
            LendingError::simulation(format!("{} line {line}: {e}", path.display()))
        })?;
        let app = HistoricalApplication::try_from(row).map_err(|e| {
            LendingError::simulation(format!("{} line {line}: {e}", path.display()))
        })?;
        corpus.push(app);
    }

    tracing::info!(rows = corpus.len(), path = %path.display(), "historical sample loaded");
    Ok(corpus)
}

pub fn write_csv(path: &Path, corpus: &[HistoricalApplication]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LendingError::io(parent, e))?;
    }

    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_io(path, e))?;
    for app in corpus {
        wtr.serialize(CsvRow::from(app)).map_err(|e| csv_io(path, e))?;
    }
    wtr.flush().map_err(|e| LendingError::io(path, e))?;

    Ok(())
}

fn csv_io(path: &Path, err: csv::Error) -> LendingError {
    LendingError::io(path, std::io::Error::other(err))
}

/// Generate a labeled corpus with the same process the scoring model was
/// trained on: uniform features, label drawn from
/// `sigmoid((850 - fico) * 0.05 + dti * 0.2 - income / 10000 - 15)`.
pub fn synthesize<R: Rng + ?Sized>(rows: usize, rng: &mut R) -> Vec<HistoricalApplication> {
    (0..rows)
        .map(|_| {
            let income = rng.random_range(20_000..250_000) as f64;
            let fico = rng.random_range(300..850) as f64;
            let dti = rng.random_range(5.0..80.0);
            let loan_amount = rng.random_range(1_000..50_000) as f64;

            let risk = (850.0 - fico) * 0.05 + dti * 0.2 - income / 10_000.0;
            let p_default = sigmoid(risk - 15.0);
            let defaulted = rng.random::<f64>() < p_default;

            HistoricalApplication {
                income,
                fico,
                dti,
                loan_amount,
                defaulted,
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    #[test]
    fn test_load_sample() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "income,fico,dti,loan_amnt,default").unwrap();
        writeln!(file, "60000,720,20.5,10000,0").unwrap();
        writeln!(file, "25000,480,61.2,4000,1").unwrap();

        let corpus = load_sample(file.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].fico, 720.0);
        assert!(!corpus[0].defaulted);
        assert_eq!(corpus[1].loan_amount, 4000.0);
        assert!(corpus[1].defaulted);
    }

    #[test]
    fn test_bad_label_is_simulation_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "income,fico,dti,loan_amnt,default").unwrap();
        writeln!(file, "60000,720,20.5,10000,2").unwrap();

        let err = load_sample(file.path()).unwrap_err();
        assert_eq!(err.code(), "VR-2002");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_missing_file_is_simulation_unavailable() {
        let err = load_sample(Path::new("/nonexistent/sample.csv")).unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_unwritable_csv_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // the target is a directory, so the csv writer cannot open it
        let err = write_csv(dir.path(), &[]).unwrap_err();
        assert_eq!(err.code(), "VR-4003");
    }

    #[test]
    fn test_realized_profit() {
        let repaid = HistoricalApplication {
            income: 1.0,
            fico: 700.0,
            dti: 1.0,
            loan_amount: 10_000.0,
            defaulted: false,
        };
        let defaulted = HistoricalApplication {
            defaulted: true,
            ..repaid
        };

        assert!((repaid.realized_profit(0.15) - 1_500.0).abs() < 1e-9);
        assert_eq!(defaulted.realized_profit(0.15), -10_000.0);
    }

    #[test]
    fn test_synthesized_corpus_round_trips_through_csv() {
        let mut rng = StdRng::seed_from_u64(42);
        let corpus = synthesize(200, &mut rng);

        assert_eq!(corpus.len(), 200);
        for app in &corpus {
            assert!((20_000.0..250_000.0).contains(&app.income));
            assert!((300.0..850.0).contains(&app.fico));
            assert!((5.0..80.0).contains(&app.dti));
            assert!((1_000.0..50_000.0).contains(&app.loan_amount));
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.csv");
        write_csv(&path, &corpus).unwrap();

        assert_eq!(load_sample(&path).unwrap(), corpus);
    }

    #[test]
    fn test_synthesis_is_seeded() {
        let a = synthesize(50, &mut StdRng::seed_from_u64(7));
        let b = synthesize(50, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
