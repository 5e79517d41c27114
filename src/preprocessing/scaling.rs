//! Подготовка матрицы признаков: ограничение выбросов и робастное
//! масштабирование

#![allow(non_snake_case)]

use ndarray::{Array2, Axis};

pub struct FeaturePreprocessor;

impl FeaturePreprocessor {
    /// Ограничивает выбросы и масштабирует признаки по медиане и IQR.
    /// Матрица изменяется на месте.
    pub fn clip_and_scale(X: &mut Array2<f64>) -> Result<(), String> {
        if X.nrows() == 0 {
            return Err("Empty dataset".to_string());
        }

        // Ограничиваем значения двумя стандартными отклонениями от
        // среднего, чтобы убрать экстремальные выбросы
        let means = X.mean_axis(Axis(0)).ok_or("Failed to compute mean")?;
        let devs = X.std_axis(Axis(0), 0.0) * 2.0;

        for (i, mut column) in X.columns_mut().into_iter().enumerate() {
            let lower = means[i] - devs[i];
            let upper = means[i] + devs[i];
            for value in column.iter_mut() {
                *value = Self::limit_value(*value, lower, upper);
            }
        }

        // Робастное масштабирование: (x - median) / IQR
        for mut column in X.columns_mut() {
            let mut sorted: Vec<f64> = column.iter().copied().collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let median = percentile(&sorted, 0.5);
            let mut iqr = percentile(&sorted, 0.75) - percentile(&sorted, 0.25);

            // Избегаем деления на ноль
            if iqr < 1e-10 {
                iqr = 1.0;
            }

            for value in column.iter_mut() {
                *value = (*value - median) / iqr;
            }
        }

        Ok(())
    }

    /// Ограничивает значение нижней и верхней границами с запасом в единицу
    fn limit_value(value: f64, lower: f64, upper: f64) -> f64 {
        if value < lower - 1.0 {
            lower
        } else if value > upper + 1.0 {
            upper
        } else {
            value
        }
    }
}

/// Перцентиль с линейной интерполяцией по отсортированному срезу
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (idx - lo as f64)
}

/// Собирает матрицу признаков из строк запроса
pub fn rows_to_matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>, String> {
    if rows.is_empty() {
        return Err("Empty dataset".to_string());
    }

    let n_features = rows[0].len();
    if n_features == 0 {
        return Err("Examples have no features".to_string());
    }

    let mut X = Array2::zeros((rows.len(), n_features));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n_features {
            return Err(format!(
                "Example {} has {} features, expected {}",
                i,
                row.len(),
                n_features
            ));
        }
        for (j, value) in row.iter().enumerate() {
            X[[i, j]] = *value;
        }
    }

    Ok(X)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn clip_limits_extreme_values() {
        // Один выброс: mean = 1, std = 3, upper = 7, запас до 8
        let mut X = Array2::zeros((10, 1));
        X[[9, 0]] = 10.0;

        FeaturePreprocessor::clip_and_scale(&mut X).unwrap();

        // IQR нулевой (guard = 1.0), медиана 0: выброс прижат к границе 7
        let max = X.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(max, 7.0);
    }

    #[test]
    fn values_within_margin_are_kept() {
        // mean = 1, std = 3: 7.9 внутри запаса upper + 1, не ограничивается
        assert_eq!(FeaturePreprocessor::limit_value(7.9, -5.0, 7.0), 7.9);
        assert_eq!(FeaturePreprocessor::limit_value(8.1, -5.0, 7.0), 7.0);
        assert_eq!(FeaturePreprocessor::limit_value(-6.1, -5.0, 7.0), -5.0);
        assert_eq!(FeaturePreprocessor::limit_value(0.5, -5.0, 7.0), 0.5);
    }

    #[test]
    fn scale_centers_on_median() {
        let mut X = array![[1.0], [2.0], [3.0], [4.0], [5.0]];

        FeaturePreprocessor::clip_and_scale(&mut X).unwrap();

        // median = 3, IQR = 4 - 2 = 2
        let expected = [-1.0, -0.5, 0.0, 0.5, 1.0];
        for (value, want) in X.column(0).iter().zip(expected.iter()) {
            assert!((value - want).abs() < 1e-12);
        }
    }

    #[test]
    fn clip_and_scale_is_idempotent() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64 * 0.3 - 6.0, (i as f64 * 0.7).sin() * 2.0])
            .collect();
        let mut once = rows_to_matrix(&rows).unwrap();
        FeaturePreprocessor::clip_and_scale(&mut once).unwrap();

        let mut twice = once.clone();
        FeaturePreprocessor::clip_and_scale(&mut twice).unwrap();

        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let mut X: Array2<f64> = Array2::zeros((0, 3));
        assert!(FeaturePreprocessor::clip_and_scale(&mut X).is_err());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(rows_to_matrix(&rows).is_err());

        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let X = rows_to_matrix(&rows).unwrap();
        assert_eq!(X.dim(), (2, 2));
    }
}
