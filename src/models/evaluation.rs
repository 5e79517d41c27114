//! Оценка качества бинарной классификации

#![allow(non_snake_case)]

use ndarray::{Array2, Axis};
use rand::Rng;

use crate::models::NeuralNetwork;
use crate::types::{EvaluationOutput, TrainingConfig};

/// Метрики по матрице ошибок
#[derive(Debug, Clone, Copy)]
pub struct BinaryMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub phi: f64,
}

/// Считает accuracy, precision, recall и коэффициент phi (Matthews)
/// по предсказаниям и фактическим меткам
pub fn binary_metrics(predictions: &[usize], labels: &[usize]) -> BinaryMetrics {
    let mut tp: f64 = 0.0;
    let mut tn: f64 = 0.0;
    let mut fp: f64 = 0.0;
    let mut fn_: f64 = 0.0;

    for (&pred, &actual) in predictions.iter().zip(labels.iter()) {
        match (pred, actual) {
            (1, 1) => tp += 1.0,
            (0, 0) => tn += 1.0,
            (1, 0) => fp += 1.0,
            _ => fn_ += 1.0,
        }
    }

    let total = tp + tn + fp + fn_;
    let accuracy = if total > 0.0 { (tp + tn) / total } else { 0.0 };
    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };

    let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
    let phi = if denominator > 0.0 {
        (tp * tn - fp * fn_) / denominator
    } else {
        0.0
    };

    BinaryMetrics {
        accuracy,
        precision,
        recall,
        phi,
    }
}

/// Предупреждение, если какой-то класс больше другого более чем втрое
pub fn check_classes_balance(counts: &[usize]) -> Option<String> {
    for &first in counts {
        for &second in counts {
            if first > second * 3 {
                return Some(
                    "Provided classes are very unbalanced, predictions may not be accurate."
                        .to_string(),
                );
            }
        }
    }
    None
}

/// Проверка пригодности модели: несколько независимых прогонов
/// обучения со случайным разбиением на train/test
pub struct ModelEvaluator {
    min_phi: f64,
    accepted_deviation: f64,
}

impl ModelEvaluator {
    pub fn new(min_phi: f64, accepted_deviation: f64) -> Self {
        Self {
            min_phi,
            accepted_deviation,
        }
    }

    pub fn evaluate(
        &self,
        config: &TrainingConfig,
        X: &Array2<f64>,
        y: &[usize],
        runs: usize,
    ) -> Result<EvaluationOutput, String> {
        if X.nrows() < 20 {
            return Err("Need at least 20 examples for evaluation".to_string());
        }
        if X.nrows() != y.len() {
            return Err("Features and labels length mismatch".to_string());
        }

        let mut warnings = Vec::new();

        let mut counts = [0usize; 2];
        for &label in y {
            if label < 2 {
                counts[label] += 1;
            }
        }
        if let Some(warning) = check_classes_balance(&counts) {
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        let mut accuracies = Vec::with_capacity(runs);
        let mut precisions = Vec::with_capacity(runs);
        let mut recalls = Vec::with_capacity(runs);
        let mut phis = Vec::with_capacity(runs);

        for run in 0..runs.max(1) {
            let (X_train, y_train, X_test, y_test) = split_examples(X, y, 0.8);

            let mut model = NeuralNetwork::new(config.clone());
            model.fit(&X_train, &y_train)?;

            let predictions = model.predict(&X_test)?;
            let metrics = binary_metrics(&predictions, &y_test);

            tracing::info!(
                "Evaluation run {}: accuracy = {:.4}, phi = {:.4}",
                run,
                metrics.accuracy,
                metrics.phi
            );

            accuracies.push(metrics.accuracy);
            precisions.push(metrics.precision);
            recalls.push(metrics.recall);
            phis.push(metrics.phi);
        }

        let phi = mean(&phis);
        let phi_deviation = std_deviation(&phis);

        let status = if phi < self.min_phi {
            "low-score"
        } else if phi_deviation > self.accepted_deviation {
            "not-reliable"
        } else {
            "ok"
        };

        Ok(EvaluationOutput {
            status: status.to_string(),
            accuracy: mean(&accuracies),
            precision: mean(&precisions),
            recall: mean(&recalls),
            phi,
            phi_deviation,
            warnings,
        })
    }
}

/// Случайное перемешивание и разбиение примеров на train/test
fn split_examples(
    X: &Array2<f64>,
    y: &[usize],
    train_ratio: f64,
) -> (Array2<f64>, Vec<usize>, Array2<f64>, Vec<usize>) {
    let n = X.nrows();
    let mut indices: Vec<usize> = (0..n).collect();

    let mut rng = rand::thread_rng();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }

    let split = (n as f64 * train_ratio) as usize;
    let (train_idx, test_idx) = indices.split_at(split);

    let X_train = X.select(Axis(0), train_idx);
    let X_test = X.select(Axis(0), test_idx);
    let y_train = train_idx.iter().map(|&i| y[i]).collect();
    let y_test = test_idx.iter().map(|&i| y[i]).collect();

    (X_train, y_train, X_test, y_test)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values
        .iter()
        .map(|value| (value - avg) * (value - avg))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}
