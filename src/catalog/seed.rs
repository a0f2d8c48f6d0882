//! Sample catalog entries loaded at startup when `SEED_CATALOG` is set.

use super::{ModelCreate, ModelRepository, ModelType};
use tracing::{info, warn};

#[allow(clippy::too_many_arguments)]
fn sample(
    name: &str,
    provider: &str,
    model_id: &str,
    model_type: ModelType,
    description: &str,
    max_tokens: u32,
    costs: (f64, f64),
    context_window: u32,
) -> ModelCreate {
    ModelCreate {
        name: name.to_string(),
        provider: provider.to_string(),
        model_id: model_id.to_string(),
        model_type,
        description: Some(description.to_string()),
        max_tokens: Some(max_tokens),
        input_cost_per_token: Some(costs.0),
        output_cost_per_token: Some(costs.1),
        context_window: Some(context_window),
        dimension: None,
        is_active: true,
    }
}

pub fn sample_models() -> Vec<ModelCreate> {
    vec![
        sample(
            "GPT-4",
            "openai",
            "gpt-4",
            ModelType::Chat,
            "GPT-4 is a large-scale, multimodal model which can accept image and text inputs and produce text outputs.",
            4096,
            (0.00003, 0.00006),
            8192,
        ),
        sample(
            "GPT-3.5 Turbo",
            "openai",
            "gpt-3.5-turbo",
            ModelType::Chat,
            "GPT-3.5 Turbo is optimized for chat at 1/10th the cost of text-davinci-003.",
            4096,
            (0.0000015, 0.000002),
            4096,
        ),
        sample(
            "Claude-3 Sonnet",
            "anthropic",
            "claude-3-sonnet-20240229",
            ModelType::Chat,
            "Claude-3 Sonnet strikes the ideal balance between intelligence and speed for enterprise workloads.",
            4096,
            (0.000003, 0.000015),
            200000,
        ),
        ModelCreate {
            dimension: Some(1536),
            ..sample(
                "Text Embedding Ada 002",
                "openai",
                "text-embedding-ada-002",
                ModelType::Embedding,
                "OpenAI's text-embedding-ada-002 model for creating embeddings.",
                8191,
                (0.0000001, 0.0),
                8191,
            )
        },
        sample(
            "Command R+",
            "cohere",
            "command-r-plus",
            ModelType::Chat,
            "Command R+ is Cohere's flagship text generation model optimized for conversational interaction and long context tasks.",
            4096,
            (0.000003, 0.000015),
            128000,
        ),
    ]
}

/// Insert the sample models that are not in the catalog yet. Returns how many were created.
pub async fn seed_catalog(repository: &dyn ModelRepository) -> usize {
    let mut created = 0;
    for model in sample_models() {
        if repository
            .find_by_model_id(&model.provider, &model.model_id)
            .await
            .is_some()
        {
            continue;
        }
        let name = model.name.clone();
        match repository.create(model).await {
            Ok(_) => created += 1,
            Err(err) => warn!(model = %name, error = %err, "Skipping sample model"),
        }
    }
    info!(created = created, "Catalog seeded");
    created
}
