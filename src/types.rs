/// Типы данных для ML модуля

use serde::{Deserialize, Serialize};

/// Конфигурация обучения нейронной сети
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Скорость обучения (epsilon)
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Коэффициент L2-регуляризации (lambda)
    #[serde(default = "default_reg_lambda")]
    pub reg_lambda: f64,
    /// Размеры двух скрытых слоев
    #[serde(default = "default_hidden")]
    pub hidden: [usize; 2],
    #[serde(default)]
    pub debug: bool,
}

fn default_iterations() -> usize { 20000 }
fn default_epsilon() -> f64 { 0.01 }
fn default_reg_lambda() -> f64 { 0.01 }
fn default_hidden() -> [usize; 2] { [5, 5] }

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            epsilon: default_epsilon(),
            reg_lambda: default_reg_lambda(),
            hidden: default_hidden(),
            debug: false,
        }
    }
}

/// Веса и смещения обученной модели: по одной матрице и одному
/// вектору-строке на слой, в порядке от входа к выходу
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub weights: Vec<Vec<Vec<f64>>>,
    pub biases: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainRequest {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    #[serde(default)]
    pub config: Option<TrainingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOutput {
    pub n_examples: usize,
    pub n_features: usize,
    pub iterations: usize,
    pub final_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub features: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictOutput {
    pub predictions: Vec<usize>,
    pub probabilities: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    /// Минимальный phi для признания модели пригодной
    pub min_phi: f64,
    /// Допустимое отклонение phi между прогонами
    pub accepted_deviation: f64,
    #[serde(default = "default_runs")]
    pub runs: usize,
    #[serde(default)]
    pub config: Option<TrainingConfig>,
}

fn default_runs() -> usize { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutput {
    pub status: String, // "ok" | "low-score" | "not-reliable"
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub phi: f64,
    pub phi_deviation: f64,
    pub warnings: Vec<String>,
}
