//! Нейронная сеть прямого распространения для бинарной классификации

#![allow(non_snake_case)]

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::types::{ModelParams, TrainingConfig};

/// Число классов на выходном слое
const N_CLASSES: usize = 2;

/// Размерности одного слоя
#[derive(Debug, Clone, Copy)]
pub struct LayerSpec {
    pub in_dim: usize,
    pub out_dim: usize,
}

/// Сеть с двумя скрытыми слоями: вход -> hidden[0] -> hidden[1] -> 2 класса.
/// Прямой и обратный проходы не привязаны к этой топологии и работают
/// с любым списком слоев.
pub struct NeuralNetwork {
    nn_iterations: usize,
    epsilon: f64,
    reg_lambda: f64,
    nn_hidden: Vec<usize>,
    debug: bool,
    num_layers: usize,
    Ws: Vec<Array2<f64>>,
    bs: Vec<Array2<f64>>,
    is_trained: bool,
}

impl NeuralNetwork {
    pub fn new(config: TrainingConfig) -> Self {
        let nn_hidden: Vec<usize> = config.hidden.to_vec();

        // Входной + скрытые + выходной
        let num_layers = 1 + nn_hidden.len() + 1;

        Self {
            nn_iterations: config.iterations,
            epsilon: config.epsilon,
            reg_lambda: config.reg_lambda,
            nn_hidden,
            debug: config.debug,
            num_layers,
            Ws: Vec::new(),
            bs: Vec::new(),
            is_trained: false,
        }
    }

    fn layer_specs(&self, n_input_dimensions: usize) -> Vec<LayerSpec> {
        let mut dims = Vec::with_capacity(self.num_layers);
        dims.push(n_input_dimensions);
        dims.extend(self.nn_hidden.iter().copied());
        dims.push(N_CLASSES);

        dims.windows(2)
            .map(|pair| LayerSpec {
                in_dim: pair[0],
                out_dim: pair[1],
            })
            .collect()
    }

    /// Случайная инициализация весов и нулевых смещений. Выполняется один
    /// раз, когда становится известна размерность входа.
    fn initialise_weights_biases(&mut self, n_input_dimensions: usize) -> Result<(), String> {
        if n_input_dimensions == 0 {
            return Err("Need at least one input feature".to_string());
        }
        if self.nn_hidden.iter().any(|&size| size == 0) {
            return Err("Hidden layer sizes must be positive".to_string());
        }

        // Фиксированный seed, чтобы результаты были воспроизводимы
        let mut rng = StdRng::seed_from_u64(0);

        let layers = self.layer_specs(n_input_dimensions);
        self.Ws = Vec::with_capacity(layers.len());
        self.bs = Vec::with_capacity(layers.len());

        for layer in &layers {
            // Масштаб 1/sqrt(in) удерживает дисперсию активаций
            // независимо от числа входов слоя
            let scale = 1.0 / (layer.in_dim as f64).sqrt();
            let weights = Array2::from_shape_fn((layer.in_dim, layer.out_dim), |_| {
                let value: f64 = StandardNormal.sample(&mut rng);
                value * scale
            });
            self.Ws.push(weights);
            self.bs.push(Array2::zeros((1, layer.out_dim)));
        }

        Ok(())
    }

    /// Обучение полным градиентным спуском: ровно nn_iterations итераций,
    /// без ранней остановки. Повторный вызов продолжает обучение с
    /// текущих параметров.
    pub fn fit(&mut self, X: &Array2<f64>, y: &[usize]) -> Result<(), String> {
        if X.nrows() == 0 {
            return Err("Empty dataset".to_string());
        }
        if X.nrows() != y.len() {
            return Err("Features and labels length mismatch".to_string());
        }
        if y.iter().any(|&label| label >= N_CLASSES) {
            return Err("Labels must be 0 or 1".to_string());
        }

        if self.Ws.is_empty() {
            self.initialise_weights_biases(X.ncols())?;
        } else if self.Ws[0].nrows() != X.ncols() {
            return Err("Input dimensionality does not match the initialised model".to_string());
        }

        for it in 0..self.nn_iterations {
            let (probs, zs, activations) = self.forward_prop(X)?;
            let (dWs, dbs) = self.back_prop(&probs, y, &zs, &activations)?;

            // У выходного слоя нет исходящих весов, поэтому только
            // до num_layers - 1
            for i in 0..self.num_layers - 1 {
                self.Ws[i].scaled_add(-self.epsilon, &dWs[i]);
                self.bs[i].scaled_add(-self.epsilon, &dbs[i]);
            }

            if self.debug && it % 1000 == 0 {
                // Потери на обучающей выборке: не показатель качества,
                // только проверка сходимости
                let loss = self.calculate_loss(X, y)?;
                tracing::info!("Iteration {}: training loss = {:.6}", it, loss);
            }
        }

        self.is_trained = true;
        Ok(())
    }

    /// Прямой проход. Возвращает вероятности классов и все промежуточные
    /// pre-активации и активации для обратного прохода.
    pub fn forward_prop(
        &self,
        X: &Array2<f64>,
    ) -> Result<(Array2<f64>, Vec<Option<Array2<f64>>>, Vec<Array2<f64>>), String> {
        if self.Ws.is_empty() {
            return Err("Model not trained".to_string());
        }
        if self.Ws.len() != self.bs.len() {
            return Err("There should be the same number of weights and biases".to_string());
        }

        let mut zs: Vec<Option<Array2<f64>>> = Vec::with_capacity(self.num_layers);
        let mut activations: Vec<Array2<f64>> = Vec::with_capacity(self.num_layers);

        // Входной слой: активации равны X, pre-активации нет
        zs.push(None);
        activations.push(X.to_owned());

        // От первого скрытого слоя до выходного
        for i in 1..self.num_layers {
            let z = activations[i - 1].dot(&self.Ws[i - 1]) + &self.bs[i - 1];
            activations.push(z.mapv(f64::tanh));
            zs.push(Some(z));
        }

        let z_output = zs[self.num_layers - 1]
            .as_ref()
            .ok_or("Missing output layer")?;

        // Softmax по выходным pre-активациям. При переполнении exp или
        // некорректном делении вся матрица заменяется сигнальным -1,
        // обучение продолжается без NaN/inf
        let exp_scores = z_output.mapv(f64::exp);
        let probs = if exp_scores.iter().any(|value| !value.is_finite()) {
            Array2::from_elem(z_output.raw_dim(), -1.0)
        } else {
            let sums = exp_scores.sum_axis(Axis(1)).insert_axis(Axis(1));
            let normalized = &exp_scores / &sums;
            if normalized.iter().any(|value| !value.is_finite()) {
                Array2::from_elem(z_output.raw_dim(), -1.0)
            } else {
                normalized
            }
        };

        Ok((probs, zs, activations))
    }

    /// Обратный проход: градиенты весов и смещений по всем слоям.
    /// Параметры сети не изменяются.
    pub fn back_prop(
        &self,
        probs: &Array2<f64>,
        y: &[usize],
        _zs: &[Option<Array2<f64>>],
        activations: &[Array2<f64>],
    ) -> Result<(Vec<Array2<f64>>, Vec<Array2<f64>>), String> {
        if self.Ws.len() != self.bs.len() {
            return Err("There should be the same number of weights and biases".to_string());
        }

        let mut deltas: Vec<Option<Array2<f64>>> = vec![None; self.num_layers];

        // Ошибка выходного слоя: probs - one_hot(y)
        let mut output_delta = probs.to_owned();
        for (example, &label) in y.iter().enumerate() {
            output_delta[[example, label]] -= 1.0;
        }
        deltas[self.num_layers - 1] = Some(output_delta);

        // От последнего скрытого слоя к первому. Производная tanh:
        // gz = 1 - a^2 (не a * (1 - a), это форма для сигмоиды)
        for i in (1..=self.num_layers - 2).rev() {
            let next_delta = deltas[i + 1].as_ref().ok_or("Missing next layer delta")?;
            let gz = activations[i].mapv(|a| 1.0 - a * a);
            let mut delta = next_delta.dot(&self.Ws[i].t()) * &gz;

            // При переполнении подставляем максимум вместо NaN/inf
            if delta.iter().any(|value| !value.is_finite()) {
                delta = Array2::from_elem(activations[i].raw_dim(), f64::MAX);
            }
            deltas[i] = Some(delta);
        }

        let mut dWs = Vec::with_capacity(self.num_layers - 1);
        let mut dbs = Vec::with_capacity(self.num_layers - 1);

        for i in 0..self.num_layers - 1 {
            let next_delta = deltas[i + 1].as_ref().ok_or("Missing layer delta")?;

            // L2-штраф добавляется прямо в градиент
            let dW = activations[i].t().dot(next_delta) + &(&self.Ws[i] * self.reg_lambda);
            let db = next_delta.sum_axis(Axis(0)).insert_axis(Axis(0));

            dWs.push(dW);
            dbs.push(db);
        }

        Ok((dWs, dbs))
    }

    /// Индекс класса с наибольшей вероятностью для каждого примера
    pub fn predict(&self, X: &Array2<f64>) -> Result<Vec<usize>, String> {
        let (probs, _, _) = self.forward_prop(X)?;

        let predictions = probs
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (class, value) in row.iter().enumerate() {
                    if *value > row[best] {
                        best = class;
                    }
                }
                best
            })
            .collect();

        Ok(predictions)
    }

    /// Матрица вероятностей классов
    pub fn predict_proba(&self, X: &Array2<f64>) -> Result<Array2<f64>, String> {
        let (probs, _, _) = self.forward_prop(X)?;
        Ok(probs)
    }

    /// Кросс-энтропия по вероятности правильного класса плюс
    /// L2-штраф, усредненная по примерам
    pub fn calculate_loss(&self, X: &Array2<f64>, y: &[usize]) -> Result<f64, String> {
        if y.is_empty() {
            return Err("Empty dataset".to_string());
        }

        let probs = self.predict_proba(X)?;

        let mut total_data_loss = 0.0;
        for (example, &label) in y.iter().enumerate() {
            total_data_loss += -probs[[example, label]].ln();
        }

        let mut weights_squares = 0.0;
        for weights in &self.Ws {
            weights_squares += weights.mapv(|w| w * w).sum();
        }
        total_data_loss += self.reg_lambda / 2.0 * weights_squares;

        Ok(total_data_loss / y.len() as f64)
    }

    /// Отдает параметры модели как обычные массивы для сохранения
    pub fn export_params(&self) -> Result<ModelParams, String> {
        if !self.is_trained {
            return Err("Model not trained".to_string());
        }

        let weights = self
            .Ws
            .iter()
            .map(|W| W.outer_iter().map(|row| row.to_vec()).collect())
            .collect();
        let biases = self.bs.iter().map(|b| b.row(0).to_vec()).collect();

        Ok(ModelParams { weights, biases })
    }

    /// Загружает сохраненные параметры в модель. Соотношение числа слоев
    /// весов и смещений проверяется при использовании, не здесь.
    pub fn import_params(&mut self, params: &ModelParams) -> Result<(), String> {
        if params.weights.is_empty() {
            return Err("Empty parameters".to_string());
        }

        let mut Ws = Vec::with_capacity(params.weights.len());
        for (layer, weights) in params.weights.iter().enumerate() {
            let rows = weights.len();
            let cols = weights.first().map(|row| row.len()).unwrap_or(0);
            if rows == 0 || cols == 0 {
                return Err(format!("Weight layer {} is empty", layer));
            }

            let mut W = Array2::zeros((rows, cols));
            for (r, row) in weights.iter().enumerate() {
                if row.len() != cols {
                    return Err(format!("Weight layer {} is not rectangular", layer));
                }
                for (c, value) in row.iter().enumerate() {
                    W[[r, c]] = *value;
                }
            }
            Ws.push(W);
        }

        for pair in Ws.windows(2) {
            if pair[0].ncols() != pair[1].nrows() {
                return Err("Weight layer shapes are not consistent".to_string());
            }
        }

        let mut bs = Vec::with_capacity(params.biases.len());
        for (layer, biases) in params.biases.iter().enumerate() {
            if let Some(W) = Ws.get(layer) {
                if biases.len() != W.ncols() {
                    return Err(format!("Bias layer {} does not match its weights", layer));
                }
            }
            let mut b = Array2::zeros((1, biases.len()));
            for (c, value) in biases.iter().enumerate() {
                b[[0, c]] = *value;
            }
            bs.push(b);
        }

        self.num_layers = Ws.len() + 1;
        self.Ws = Ws;
        self.bs = bs;
        self.is_trained = true;

        Ok(())
    }
}

impl Default for NeuralNetwork {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::Normal;

    fn small_config(iterations: usize) -> TrainingConfig {
        TrainingConfig {
            iterations,
            epsilon: 0.01,
            reg_lambda: 0.01,
            hidden: [5, 5],
            debug: false,
        }
    }

    /// Два гауссовых кластера: (-2, -2) это класс 0, (2, 2) это класс 1
    fn gaussian_clusters(n_per_class: usize) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(42);
        let noise = Normal::new(0.0, 0.5).unwrap();

        let mut X = Array2::zeros((n_per_class * 2, 2));
        let mut y = Vec::with_capacity(n_per_class * 2);

        for i in 0..n_per_class * 2 {
            let center = if i < n_per_class { -2.0 } else { 2.0 };
            X[[i, 0]] = center + noise.sample(&mut rng);
            X[[i, 1]] = center + noise.sample(&mut rng);
            y.push(if i < n_per_class { 0 } else { 1 });
        }

        (X, y)
    }

    #[test]
    fn predict_proba_has_two_columns_per_example() {
        let (X, y) = gaussian_clusters(30);
        let mut nn = NeuralNetwork::new(small_config(50));
        nn.fit(&X, &y).unwrap();

        let probs = nn.predict_proba(&X).unwrap();
        assert_eq!(probs.dim(), (60, 2));
    }

    #[test]
    fn predictions_are_valid_class_indices() {
        let (X, y) = gaussian_clusters(25);
        let mut nn = NeuralNetwork::new(small_config(100));
        nn.fit(&X, &y).unwrap();

        for class in nn.predict(&X).unwrap() {
            assert!(class < 2);
        }
    }

    #[test]
    fn fit_is_deterministic() {
        let (X, y) = gaussian_clusters(20);

        let mut first = NeuralNetwork::new(small_config(200));
        first.fit(&X, &y).unwrap();
        let mut second = NeuralNetwork::new(small_config(200));
        second.fit(&X, &y).unwrap();

        let a = first.export_params().unwrap();
        let b = second.export_params().unwrap();
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.biases, b.biases);
    }

    #[test]
    fn separable_clusters_are_learned() {
        let (X, y) = gaussian_clusters(100);
        let mut nn = NeuralNetwork::new(small_config(2000));
        nn.fit(&X, &y).unwrap();

        let predictions = nn.predict(&X).unwrap();
        let correct = predictions
            .iter()
            .zip(y.iter())
            .filter(|(pred, actual)| pred == actual)
            .count();
        let accuracy = correct as f64 / y.len() as f64;
        assert!(accuracy > 0.9, "accuracy = {}", accuracy);
    }

    #[test]
    fn loss_decreases_as_training_continues() {
        let (X, y) = gaussian_clusters(50);

        let mut nn = NeuralNetwork::new(small_config(50));
        nn.fit(&X, &y).unwrap();
        let early_loss = nn.calculate_loss(&X, &y).unwrap();

        // Повторный fit продолжает с текущих параметров
        nn.fit(&X, &y).unwrap();
        nn.fit(&X, &y).unwrap();
        let later_loss = nn.calculate_loss(&X, &y).unwrap();

        assert!(later_loss < early_loss, "{} -> {}", later_loss, early_loss);
    }

    #[test]
    fn exp_overflow_saturates_to_sentinel() {
        let mut nn = NeuralNetwork::new(small_config(1));

        // Веса, доводящие выходной слой до переполнения exp
        let huge = 1.0e300;
        nn.import_params(&ModelParams {
            weights: vec![
                vec![vec![huge, huge]; 2],
                vec![vec![huge, huge]; 2],
                vec![vec![huge, huge]; 2],
            ],
            biases: vec![vec![0.0, 0.0]; 3],
        })
        .unwrap();

        let X = ndarray::array![[1.0, 1.0]];
        let probs = nn.predict_proba(&X).unwrap();
        for value in probs.iter() {
            assert_eq!(*value, -1.0);
        }

        // Индекс класса остается корректным даже на сигнальных значениях
        for class in nn.predict(&X).unwrap() {
            assert!(class < 2);
        }
    }

    #[test]
    fn mismatched_weights_and_biases_are_rejected() {
        let mut nn = NeuralNetwork::new(small_config(1));

        // Поврежденное состояние: три слоя весов, два слоя смещений
        nn.import_params(&ModelParams {
            weights: vec![
                vec![vec![0.1, 0.1]; 2],
                vec![vec![0.1, 0.1]; 2],
                vec![vec![0.1, 0.1]; 2],
            ],
            biases: vec![vec![0.0, 0.0]; 2],
        })
        .unwrap();

        let probs = Array2::zeros((1, 2));
        let err = nn.back_prop(&probs, &[0], &[], &[]).unwrap_err();
        assert_eq!(
            err,
            "There should be the same number of weights and biases"
        );

        // Прямой проход защищен той же проверкой
        let X = ndarray::array![[1.0, 1.0]];
        assert!(nn.predict(&X).is_err());
    }

    #[test]
    fn refit_with_different_dimensionality_is_rejected() {
        let (X, y) = gaussian_clusters(10);
        let mut nn = NeuralNetwork::new(small_config(10));
        nn.fit(&X, &y).unwrap();

        let wide = Array2::zeros((4, 3));
        assert!(nn.fit(&wide, &[0, 1, 0, 1]).is_err());
    }

    #[test]
    fn untrained_model_cannot_predict() {
        let nn = NeuralNetwork::new(small_config(10));
        let X = ndarray::array![[1.0, 2.0]];
        assert_eq!(nn.predict(&X).unwrap_err(), "Model not trained");
    }

    #[test]
    fn params_round_trip_through_export() {
        let (X, y) = gaussian_clusters(20);
        let mut nn = NeuralNetwork::new(small_config(300));
        nn.fit(&X, &y).unwrap();

        let params = nn.export_params().unwrap();
        let mut restored = NeuralNetwork::new(small_config(300));
        restored.import_params(&params).unwrap();

        assert_eq!(nn.predict(&X).unwrap(), restored.predict(&X).unwrap());
    }
}
