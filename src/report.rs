use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use log::info;
use polars::{
    frame::DataFrame,
    io::SerWriter,
    prelude::{Column, CsvWriter},
};

use crate::{error::Result, trainer::EvalEpisode};

pub const ROLLING_WINDOW: usize = 50;

/// Triangular window weights, as `scipy.signal.windows.triang`.
fn triangular_weights(window: usize) -> Vec<f32> {
    let m = window as f32;
    (1..=window)
        .map(|n| {
            let n = n as f32;
            let half = n.min(m + 1.0 - n);
            if window % 2 == 0 {
                (2.0 * half - 1.0) / m
            } else {
                2.0 * half / (m + 1.0)
            }
        })
        .collect()
}

/// Triangular-weighted moving average; `None` until a full window is available.
pub fn triangular_rolling_mean(values: &[f32], window: usize) -> Vec<Option<f32>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let weights = triangular_weights(window);
    let total: f32 = weights.iter().sum();
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let weighted: f32 = slice.iter().zip(&weights).map(|(v, w)| v * w).sum();
            Some(weighted / total)
        })
        .collect()
}

fn write_csv(dir: &Path, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    let mut file = File::create(&path)?;
    CsvWriter::new(&mut file).finish(df)?;
    info!("Wrote {:?}", path);
    Ok(path)
}

/// Per-episode training rewards with the epsilon in effect and a smoothed curve.
pub fn write_training_report(
    dir: impl AsRef<Path>,
    rewards: &[f32],
    epsilons: &[f64],
) -> Result<PathBuf> {
    let episodes: Vec<u32> = (1..=rewards.len() as u32).collect();
    let rolling = triangular_rolling_mean(rewards, ROLLING_WINDOW);
    let mut df = DataFrame::new(vec![
        Column::new("episode".into(), episodes),
        Column::new("reward".into(), rewards.to_vec()),
        Column::new("epsilon".into(), epsilons.to_vec()),
        Column::new("rolling_mean".into(), rolling),
    ])?;
    write_csv(dir.as_ref(), "training_rewards.csv", &mut df)
}

pub fn write_evaluation_report(dir: impl AsRef<Path>, results: &[EvalEpisode]) -> Result<PathBuf> {
    let episodes: Vec<u32> = (1..=results.len() as u32).collect();
    let rewards: Vec<f32> = results.iter().map(|r| r.reward).collect();
    let steps: Vec<u32> = results.iter().map(|r| r.steps as u32).collect();
    let mut df = DataFrame::new(vec![
        Column::new("episode".into(), episodes),
        Column::new("reward".into(), rewards),
        Column::new("steps".into(), steps),
    ])?;
    write_csv(dir.as_ref(), "evaluation.csv", &mut df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn triangular_weights_are_symmetric() {
        for window in [5, 50] {
            let w = triangular_weights(window);
            let reversed: Vec<f32> = w.iter().rev().copied().collect();
            assert_eq!(w, reversed);
            assert!(w.iter().all(|v| *v > 0.0 && *v <= 1.0));
        }
        assert_eq!(triangular_weights(4), vec![0.25, 0.75, 0.75, 0.25]);
    }

    #[test]
    fn rolling_mean_of_constant_is_constant() {
        let values = vec![3.0; 60];
        let rolling = triangular_rolling_mean(&values, ROLLING_WINDOW);
        assert!(rolling[..ROLLING_WINDOW - 1].iter().all(Option::is_none));
        for v in rolling[ROLLING_WINDOW - 1..].iter() {
            assert!((v.unwrap() - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn writes_training_csv() -> Result<()> {
        let tmp_dir = TempDir::new("report")?;
        let path = write_training_report(tmp_dir.path(), &[1.0, -2.5, 100.0], &[1.0, 0.998, 0.996])?;
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("episode,reward,epsilon,rolling_mean"));
        assert_eq!(lines.count(), 3);
        Ok(())
    }

    #[test]
    fn writes_evaluation_csv() -> Result<()> {
        let tmp_dir = TempDir::new("report")?;
        let results = vec![
            EvalEpisode {
                reward: 230.5,
                steps: 312,
            },
            EvalEpisode {
                reward: -80.0,
                steps: 95,
            },
        ];
        let path = write_evaluation_report(tmp_dir.path(), &results)?;
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("episode,reward,steps"));
        assert!(lines.last().is_some_and(|l| l.starts_with("2,") && l.ends_with(",95")));
        Ok(())
    }
}
