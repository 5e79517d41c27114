/// API сервер для обучения и применения классификатора

use axum::{
    extract::State,
    http::Method,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber;

use inspire_ml::{
    models::ModelEvaluator,
    models::NeuralNetwork,
    preprocessing::{rows_to_matrix, FeaturePreprocessor},
    types::{
        EvaluateRequest, EvaluationOutput, ModelParams, PredictOutput, PredictRequest,
        TrainOutput, TrainRequest, TrainingConfig,
    },
};

#[derive(Clone)]
struct AppState {
    model: std::sync::Arc<tokio::sync::Mutex<NeuralNetwork>>,
}

#[tokio::main]
async fn main() {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = AppState {
        model: std::sync::Arc::new(tokio::sync::Mutex::new(NeuralNetwork::new(
            TrainingConfig::default(),
        ))),
    };

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/train", post(train))
        .route("/api/predict", post(predict))
        .route("/api/evaluate", post(evaluate))
        .route("/api/model", get(export_model).post(import_model))
        .layer(cors)
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8000));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    tracing::info!("Server listening on http://0.0.0.0:8000");
    axum::serve(listener, app).await.unwrap();
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Inspire ML API (Rust)",
        "version": "0.1.0"
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn train(
    State(state): State<AppState>,
    Json(data): Json<TrainRequest>,
) -> Result<Json<TrainOutput>, String> {
    tracing::info!("Train request: {} examples", data.features.len());

    let mut X = rows_to_matrix(&data.features)?;
    FeaturePreprocessor::clip_and_scale(&mut X)?;

    let config = data.config.unwrap_or_default();
    let iterations = config.iterations;

    let mut model = NeuralNetwork::new(config);
    model.fit(&X, &data.labels)?;
    let final_loss = model.calculate_loss(&X, &data.labels)?;

    let output = TrainOutput {
        n_examples: X.nrows(),
        n_features: X.ncols(),
        iterations,
        final_loss,
    };

    *state.model.lock().await = model;
    tracing::info!("Model trained. Training loss: {:.6}", final_loss);

    Ok(Json(output))
}

/// Признаки должны быть подготовлены так же, как при обучении:
/// небольшие батчи не масштабируются по самим себе
async fn predict(
    State(state): State<AppState>,
    Json(data): Json<PredictRequest>,
) -> Result<Json<PredictOutput>, String> {
    tracing::info!("Predict request: {} examples", data.features.len());

    let X = rows_to_matrix(&data.features)?;

    let model = state.model.lock().await;
    let predictions = model.predict(&X)?;
    let probs = model.predict_proba(&X)?;

    Ok(Json(PredictOutput {
        predictions,
        probabilities: probs.outer_iter().map(|row| row.to_vec()).collect(),
    }))
}

// Оценка обучает собственные модели и не трогает текущую
async fn evaluate(Json(data): Json<EvaluateRequest>) -> Result<Json<EvaluationOutput>, String> {
    tracing::info!(
        "Evaluate request: {} examples, {} runs",
        data.features.len(),
        data.runs
    );

    let mut X = rows_to_matrix(&data.features)?;
    FeaturePreprocessor::clip_and_scale(&mut X)?;

    let config = data.config.unwrap_or_default();
    let evaluator = ModelEvaluator::new(data.min_phi, data.accepted_deviation);
    let output = evaluator.evaluate(&config, &X, &data.labels, data.runs)?;

    tracing::info!("Evaluation finished: status = {}", output.status);

    Ok(Json(output))
}

async fn export_model(State(state): State<AppState>) -> Result<Json<ModelParams>, String> {
    let model = state.model.lock().await;
    Ok(Json(model.export_params()?))
}

async fn import_model(
    State(state): State<AppState>,
    Json(params): Json<ModelParams>,
) -> Result<Json<serde_json::Value>, String> {
    tracing::info!("Import model: {} weight layers", params.weights.len());

    let mut model = state.model.lock().await;
    model.import_params(&params)?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
