use anyhow::ensure;
use futures::StreamExt;
use serde_json::json;

use crate::config::{LOAD_CHECK_POOL_SIZE, LOAD_CHECK_REQUESTS};
use crate::smoke::report::CheckReport;
use crate::smoke::types::*;
use crate::smoke::SmokeContext;

/// Backend health endpoint and the frontend root page.
pub async fn health_suite(ctx: &SmokeContext, report: &mut CheckReport) {
    report
        .run("backend /api/health", async {
            let url = format!("{}/api/health", ctx.backend_url);
            let health: HealthResponse = get_json(&ctx.client, &url).await?;
            Ok(Some(format!(
                "status={}, database={}",
                health.status, health.database
            )))
        })
        .await;

    report
        .run("frontend root", async {
            let resp = ctx.client.get(&ctx.frontend_url).send().await?;
            ensure!(
                resp.status().is_success(),
                "unexpected status {}",
                resp.status()
            );
            Ok(None)
        })
        .await;
}

/// Register, duplicate-register and login against the auth endpoints.
/// The username is unique per run so the first registration gets a 201.
pub async fn auth_suite(ctx: &SmokeContext, report: &mut CheckReport) {
    let username = format!("smoke_{}", chrono::Utc::now().timestamp_millis());
    let email = format!("{}@example.com", username);
    let password = "smoke-test-password-123";
    let register_url = format!("{}/api/auth/register", ctx.backend_url);
    let register_body = json!({
        "username": username,
        "email": email,
        "password": password,
    });

    report
        .run("register new user", async {
            let (status, body) = post_raw(&ctx.client, &register_url, &register_body).await?;
            ensure!(status == 201, "expected 201, got {}: {}", status, body);
            Ok(None)
        })
        .await;

    report
        .run("duplicate register rejected", async {
            let (status, body) = post_raw(&ctx.client, &register_url, &register_body).await?;
            ensure!(status == 400, "expected 400, got {}", status);
            let msg: MessageResponse = serde_json::from_str(&body)
                .map_err(|e| anyhow::anyhow!("schema mismatch: {}", e))?;
            ensure!(
                msg.message.contains("already exists"),
                "message does not mention 'already exists': {}",
                msg.message
            );
            Ok(None)
        })
        .await;

    report
        .run("login returns token", async {
            let url = format!("{}/api/auth/login", ctx.backend_url);
            let body = json!({"username": username, "password": password});
            let login: LoginResponse = post_json(&ctx.client, &url, &body).await?;
            ensure!(!login.token.is_empty(), "empty token");
            Ok(Some(format!("token length {}", login.token.len())))
        })
        .await;
}

/// Medicine search, indication lookup, details, predict and combined.
pub async fn search_suite(ctx: &SmokeContext, report: &mut CheckReport) {
    report
        .run("medicine search (turmeric)", async {
            let url = format!("{}/ai/medicine-search", ctx.ai_url);
            let body = json!({"query": "turmeric", "limit": 3});
            let search: MedicineSearchResponse = post_json(&ctx.client, &url, &body).await?;
            ensure!(
                search.total_results >= 0,
                "negative total_results {}",
                search.total_results
            );
            for medicine in &search.medicines {
                ensure!(!medicine.name.is_empty(), "medicine record with empty name");
                ensure!(
                    !medicine.category.is_empty(),
                    "medicine record with empty category"
                );
            }
            Ok(Some(format!(
                "{} results, confidence {:.1}, severity {}",
                search.total_results, search.ai_analysis.confidence, search.ai_analysis.severity
            )))
        })
        .await;

    report
        .run("medicines by indication (pain)", async {
            let url = format!("{}/ai/medicines-by-indication", ctx.ai_url);
            let body = json!({"indication": "pain", "limit": 5});
            let resp: IndicationResponse = post_json(&ctx.client, &url, &body).await?;
            ensure!(resp.total_results >= 0, "negative total_results");
            Ok(Some(format!("{} results", resp.total_results)))
        })
        .await;

    report
        .run("medicine details (ibuprofen)", async {
            let url = format!("{}/ai/medicine-details/ibuprofen", ctx.ai_url);
            let details: MedicineDetailsResponse = get_json(&ctx.client, &url).await?;
            Ok(Some(format!(
                "{} interactions, {} warnings, {} counseling points",
                details.safety_information.drug_interactions.len(),
                details.safety_information.warnings.len(),
                details.patient_counseling.len()
            )))
        })
        .await;

    report
        .run("symptom prediction", async {
            let url = format!("{}/predict", ctx.ai_url);
            let body = json!({"symptoms": "headache and fever"});
            let predict: PredictResponse = post_json(&ctx.client, &url, &body).await?;
            Ok(Some(format!("confidence {:.2}", predict.confidence)))
        })
        .await;

    report
        .run("combined recommendations", async {
            let url = format!("{}/combined", ctx.ai_url);
            let body = json!({"symptoms": "headache"});
            let combined: CombinedResponse = post_json(&ctx.client, &url, &body).await?;
            Ok(Some(format!(
                "{} medicines, {} recommendations",
                combined.medicines.len(),
                combined.recommendations.len()
            )))
        })
        .await;
}

/// The richer AI analysis endpoints, including all three treatment types.
pub async fn analysis_suite(ctx: &SmokeContext, report: &mut CheckReport) {
    report
        .run("enhanced medicine recommendations", async {
            let url = format!("{}/ai/enhanced-medicine-recommendations", ctx.ai_url);
            let body = json!({"symptoms": "headache", "user_id": "smoke_user"});
            let resp: EnhancedMedicineRecommendations =
                post_json(&ctx.client, &url, &body).await?;
            ensure!(
                resp.ai_analysis.high_confidence_count >= 0,
                "negative high_confidence_count"
            );
            Ok(Some(format!("{} recommendations", resp.recommendations.len())))
        })
        .await;

    report
        .run("comprehensive symptom analysis", async {
            let url = format!("{}/ai/comprehensive-symptom-analysis", ctx.ai_url);
            let body = json!({"symptoms": "headache and nausea", "user_id": "smoke_user"});
            let resp: SymptomAnalysisResponse = post_json(&ctx.client, &url, &body).await?;
            ensure!(resp.success, "success flag is false");
            Ok(Some(format!(
                "{} symptoms detected, confidence {:.2}",
                resp.analysis.detected_symptoms.len(),
                resp.analysis.overall_confidence
            )))
        })
        .await;

    for treatment_type in ["both", "naturopathy", "allopathy"] {
        report
            .run(
                &format!("enhanced recommendations ({})", treatment_type),
                async {
                    let url = format!("{}/ai/enhanced-recommendations", ctx.ai_url);
                    let body = json!({
                        "symptoms": "joint pain",
                        "treatment_type": treatment_type,
                    });
                    let resp: EnhancedRecommendationsResponse =
                        post_json(&ctx.client, &url, &body).await?;
                    ensure!(resp.success, "success flag is false");
                    Ok(Some(format!(
                        "approach {}, confidence {:.2}",
                        resp.treatment_approach, resp.confidence_score
                    )))
                },
            )
            .await;
    }
}

/// A bounded pool of concurrent analysis requests with distinct user ids.
/// Each request yields its own independent record; an individual failure
/// never takes down the harness.
pub async fn load_suite(ctx: &SmokeContext, report: &mut CheckReport) {
    let url = format!("{}/ai/comprehensive-symptom-analysis", ctx.ai_url);

    let results: Vec<(usize, Result<SymptomAnalysisResponse, ProbeError>)> =
        futures::stream::iter(0..LOAD_CHECK_REQUESTS)
            .map(|i| {
                let client = ctx.client.clone();
                let url = url.clone();
                async move {
                    let body = json!({
                        "symptoms": format!("test symptoms {}", i),
                        "user_id": format!("load_user_{}", i),
                    });
                    let result = post_json::<SymptomAnalysisResponse>(&client, &url, &body).await;
                    (i, result)
                }
            })
            .buffer_unordered(LOAD_CHECK_POOL_SIZE)
            .collect()
            .await;

    for (i, result) in results {
        let label = format!("concurrent analysis {}", i);
        match result {
            Ok(resp) => report.pass(
                &label,
                Some(format!("confidence {:.2}", resp.analysis.overall_confidence)),
            ),
            Err(e) => report.fail(&label, e.to_string()),
        }
    }
}
