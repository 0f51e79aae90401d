//! Axum route handlers for the Tailoring API.

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::document::extract_text;
use crate::document::format::SourceFormat;
use crate::errors::AppError;
use crate::sessions::Session;
use crate::state::AppState;
use crate::tailoring::applicator::apply_edits;
use crate::tailoring::models::{flatten_edits, AnalysisResult, EditOutcome, SectionAnalysis};
use crate::tailoring::orchestrator::{
    analyze_resume, export_resume, extract_resume, generate_tailored_resume, PipelineStage,
};
use crate::tailoring::preview::{redline_sections, SectionRedline};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub session_id: Uuid,
    pub filename: String,
    pub format: SourceFormat,
    pub stage: PipelineStage,
    pub analysis: AnalysisResult,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub session_id: Uuid,
    /// Client-reviewed sections. Defaults to the stored analysis.
    #[serde(default)]
    pub sections: Option<Vec<SectionAnalysis>>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub session_id: Uuid,
    pub artifact_id: String,
    pub download_url: String,
    pub format: SourceFormat,
    pub applied: usize,
    pub skipped: usize,
    pub outcomes: Vec<EditOutcome>,
    pub tailored_text: String,
    pub stage: PipelineStage,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub session_id: Uuid,
    pub filename: String,
    pub job_description: String,
    pub stage: PipelineStage,
    pub analysis: AnalysisResult,
    pub redlines: Vec<SectionRedline>,
    pub tailored_text: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/tailor/analyze
///
/// Multipart fields: `resume` (file) and `job_description` (text).
/// Extracts the resume, runs gap analysis and opens a session for the later stages.
pub async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("resume") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "resume".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read resume: {e}")))?;
                upload = Some((filename, data));
            }
            Some("job_description") => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read job_description: {e}"))
                })?;
                job_description = Some(text);
            }
            _ => {}
        }
    }

    let (filename, source) =
        upload.ok_or_else(|| AppError::Validation("resume file is required".to_string()))?;
    if source.is_empty() {
        return Err(AppError::Validation("resume file is empty".to_string()));
    }
    let job_description = job_description
        .filter(|jd| !jd.trim().is_empty())
        .ok_or_else(|| AppError::Validation("job_description cannot be empty".to_string()))?;

    let format = SourceFormat::detect(&source, Some(&filename))?;

    // Conversion is CPU-bound; keep it off the async executor.
    let bytes = source.clone();
    let resume = tokio::task::spawn_blocking(move || extract_resume(format, &bytes))
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!("spawn_blocking failed extracting resume: {e}"))
        })??;
    if resume.text.is_empty() {
        warn!("No text extracted from {filename}; analysis will be empty");
    }

    let analysis = analyze_resume(state.llm.as_ref(), &resume, &job_description).await;

    let session = Session::new(filename, source, job_description, resume, analysis);
    let response = AnalyzeResponse {
        session_id: session.id,
        filename: session.filename.clone(),
        format: session.format(),
        stage: session.stage,
        analysis: session.analysis.clone(),
    };
    info!("Session {} opened for {}", session.id, session.filename);
    state.sessions.insert(session).await;

    Ok(Json(response))
}

/// POST /api/v1/tailor/generate
///
/// Applies the session's (or the client's) edits to a fresh copy of the original document,
/// exports it in the source format and stores the artifact for download.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let session = state.sessions.get(request.session_id).await?;
    let session_id = session.id;
    let sections = request
        .sections
        .unwrap_or_else(|| session.analysis.sections.clone());
    let policy = state.config.append_policy;
    let artifacts = state.artifacts.clone();

    let (tailored, exported_format, artifact_id) =
        tokio::task::spawn_blocking(move || -> Result<_, AppError> {
            let tailored = generate_tailored_resume(&session.resume.document, &sections, policy);
            let exported = export_resume(session.format(), &session.source, &tailored)?;
            let artifact_id = artifacts.write(session_id, &exported)?;
            Ok((tailored, exported.format, artifact_id))
        })
        .await
        .map_err(|e| {
            AppError::Internal(anyhow::anyhow!("spawn_blocking failed generating resume: {e}"))
        })??;

    if let Err(e) = state
        .sessions
        .advance(session_id, PipelineStage::Exported)
        .await
    {
        warn!("Session {session_id} expired during generation: {e}");
    }
    info!("Session {session_id}: artifact {artifact_id} ready");

    Ok(Json(GenerateResponse {
        session_id,
        download_url: format!("/api/v1/tailor/download/{artifact_id}"),
        artifact_id,
        format: exported_format,
        applied: tailored.report.applied_count(),
        skipped: tailored.report.skipped_count(),
        outcomes: tailored.report.outcomes,
        tailored_text: extract_text(&tailored.document),
        stage: PipelineStage::Exported,
    }))
}

/// GET /api/v1/tailor/sessions/:id/preview
///
/// Per-section redlines of the stored analysis, plus the text the tailored document would
/// have. Nothing is exported.
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<PreviewResponse>, AppError> {
    let session = state.sessions.get(session_id).await?;

    let redlines = redline_sections(&session.analysis.sections, &session.resume.text);
    let mut document = session.resume.document.clone();
    apply_edits(
        &mut document,
        &flatten_edits(&session.analysis.sections),
        state.config.append_policy,
    );

    Ok(Json(PreviewResponse {
        session_id,
        filename: session.filename,
        job_description: session.job_description,
        stage: session.stage,
        analysis: session.analysis,
        redlines,
        tailored_text: extract_text(&document),
    }))
}

/// GET /api/v1/tailor/download/:artifact
pub async fn handle_download(
    State(state): State<AppState>,
    Path(artifact): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let not_found = || AppError::NotFound(format!("Artifact {artifact} not found"));

    let (path, format) = state.artifacts.resolve(&artifact).ok_or_else(not_found)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Failed to read artifact {artifact}: {e}"
            )))
        }
    };

    let disposition = format!(
        "attachment; filename=\"tailored-resume.{}\"",
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Duration;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::document::docx::tests::{docx_with_body, document_xml};
    use crate::llm_client::testing::ScriptedLlm;
    use crate::routes::build_router;
    use crate::sessions::{ArtifactStore, SessionStore};
    use crate::state::AppState;
    use crate::tailoring::applicator::AppendPolicy;

    const BOUNDARY: &str = "tailor-test-boundary";
    const RESUME: &str = "EXPERIENCE\nManaged a team of 5 developers.\nBuilt CI in Jenkins.\n";
    const JD: &str = "Engineering manager with measurable delivery improvements and GitHub Actions.";

    const STRUCTURE: &str = r#"{"sections": [{
        "section_name": "Experience",
        "original_text": "Managed a team of 5 developers.\nBuilt CI in Jenkins.",
        "gaps": ["No metrics"],
        "suggestions": ["Quantify outcomes"],
        "edits": [
            {"target_text": "Managed a team of 5 developers.",
             "new_content": "Led a team of 5 developers, improving delivery speed by 20%.",
             "action": "replace"},
            {"target_text": "Kubernetes", "new_content": "K8s", "action": "replace"}
        ]
    }]}"#;
    const SCORES: &str = r#"{"initial_score": 55, "projected_score": 78, "reasoning": "Metrics"}"#;

    fn app(llm: ScriptedLlm) -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            anthropic_api_key: "test-key".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            work_dir: dir.path().to_path_buf(),
            session_ttl_minutes: 60,
            append_policy: AppendPolicy::SameParagraph,
        };
        let state = AppState {
            llm: Arc::new(llm),
            sessions: SessionStore::new(Duration::minutes(config.session_ttl_minutes)),
            artifacts: ArtifactStore::new(dir.path()),
            config,
        };
        (build_router(state), dir)
    }

    fn multipart_request(
        filename: &str,
        resume: &[u8],
        job_description: Option<&str>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(resume);
        body.extend_from_slice(b"\r\n");
        if let Some(jd) = job_description {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"job_description\"\r\n\r\n{jd}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/tailor/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn analyze(app: &Router, filename: &str, resume: &[u8]) -> Value {
        let response = app
            .clone()
            .oneshot(multipart_request(filename, resume, Some(JD)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_analyze_generate_download_plain_text() {
        let (app, _dir) = app(ScriptedLlm::new(vec![Some(STRUCTURE), Some(SCORES)]));

        let analyzed = analyze(&app, "resume.txt", RESUME.as_bytes()).await;
        assert_eq!(analyzed["format"], "plain_text");
        assert_eq!(analyzed["stage"], "analyzed");
        assert_eq!(analyzed["analysis"]["initial_score"], 55);
        assert_eq!(analyzed["analysis"]["projected_score"], 78);
        let session_id = analyzed["session_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/v1/tailor/generate",
                json!({ "session_id": session_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let generated = body_json(response).await;
        assert_eq!(generated["applied"], 1);
        assert_eq!(generated["skipped"], 1);
        assert_eq!(generated["outcomes"][1]["status"], "not_found");
        assert_eq!(generated["stage"], "exported");
        assert_eq!(
            generated["tailored_text"],
            "EXPERIENCE\nLed a team of 5 developers, improving delivery speed by 20%.\nBuilt CI in Jenkins."
        );
        let artifact_id = generated["artifact_id"].as_str().unwrap();
        assert!(artifact_id.starts_with(&session_id));

        let response = app
            .clone()
            .oneshot(get(generated["download_url"].as_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            String::from_utf8(body_bytes(response).await).unwrap(),
            "EXPERIENCE\nLed a team of 5 developers, improving delivery speed by 20%.\nBuilt CI in Jenkins.\n"
        );
    }

    #[tokio::test]
    async fn test_generate_with_client_sections_overrides_analysis() {
        let (app, _dir) = app(ScriptedLlm::new(vec![Some(STRUCTURE), Some(SCORES)]));
        let analyzed = analyze(&app, "resume.txt", RESUME.as_bytes()).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/v1/tailor/generate",
                json!({
                    "session_id": analyzed["session_id"],
                    "sections": [{
                        "section_name": "Experience",
                        "edits": [{"target_text": "Jenkins", "new_content": "GitHub Actions"}]
                    }]
                }),
            ))
            .await
            .unwrap();
        let generated = body_json(response).await;
        assert_eq!(generated["applied"], 1);
        assert_eq!(
            generated["tailored_text"],
            "EXPERIENCE\nManaged a team of 5 developers.\nBuilt CI in GitHub Actions."
        );
    }

    #[tokio::test]
    async fn test_generate_twice_starts_from_original() {
        let (app, _dir) = app(ScriptedLlm::new(vec![Some(STRUCTURE), Some(SCORES)]));
        let analyzed = analyze(&app, "resume.txt", RESUME.as_bytes()).await;
        let request = json!({ "session_id": analyzed["session_id"] });

        let first = body_json(
            app.clone()
                .oneshot(json_request("/api/v1/tailor/generate", request.clone()))
                .await
                .unwrap(),
        )
        .await;
        let second = body_json(
            app.clone()
                .oneshot(json_request("/api/v1/tailor/generate", request))
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(first["tailored_text"], second["tailored_text"]);
        assert_ne!(first["artifact_id"], second["artifact_id"]);
    }

    #[tokio::test]
    async fn test_docx_round_trip_keeps_untouched_paragraphs() {
        let heading = r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>EXPERIENCE</w:t></w:r></w:p>"#;
        let source = docx_with_body(&format!(
            r#"{heading}<w:p><w:r><w:rPr><w:sz w:val="22"/></w:rPr><w:t>Managed a team of 5 developers.</w:t></w:r></w:p>"#
        ));
        let (app, _dir) = app(ScriptedLlm::new(vec![Some(STRUCTURE), Some(SCORES)]));
        let analyzed = analyze(&app, "resume.docx", &source).await;
        assert_eq!(analyzed["format"], "docx");

        let generated = body_json(
            app.clone()
                .oneshot(json_request(
                    "/api/v1/tailor/generate",
                    json!({ "session_id": analyzed["session_id"] }),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(generated["format"], "docx");

        let response = app
            .clone()
            .oneshot(get(generated["download_url"].as_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(
            response.headers()["content-type"],
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        let xml = document_xml(&body_bytes(response).await);
        assert!(xml.contains(heading));
        assert!(xml.contains("Led a team of 5 developers, improving delivery speed by 20%."));
        assert!(xml.contains(r#"<w:rPr><w:sz w:val="22"/></w:rPr>"#));
    }

    #[tokio::test]
    async fn test_failed_analysis_still_opens_session() {
        let (app, _dir) = app(ScriptedLlm::new(vec![None]));
        let analyzed = analyze(&app, "resume.txt", RESUME.as_bytes()).await;
        assert_eq!(analyzed["analysis"]["sections"], json!([]));
        assert_eq!(analyzed["analysis"]["initial_score"], 0);

        let generated = body_json(
            app.clone()
                .oneshot(json_request(
                    "/api/v1/tailor/generate",
                    json!({ "session_id": analyzed["session_id"] }),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(generated["applied"], 0);
        assert_eq!(
            generated["tailored_text"],
            "EXPERIENCE\nManaged a team of 5 developers.\nBuilt CI in Jenkins."
        );
    }

    #[tokio::test]
    async fn test_preview_returns_redlines() {
        let (app, _dir) = app(ScriptedLlm::new(vec![Some(STRUCTURE), Some(SCORES)]));
        let analyzed = analyze(&app, "resume.txt", RESUME.as_bytes()).await;
        let session_id = analyzed["session_id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/tailor/sessions/{session_id}/preview")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let preview = body_json(response).await;

        let redline = &preview["redlines"][0];
        assert_eq!(redline["section_name"], "Experience");
        assert_eq!(redline["segments"][0]["kind"], "replaced");
        assert_eq!(redline["segments"][1]["kind"], "unchanged");
        assert_eq!(redline["unplaced_edits"], json!([1]));
        assert!(preview["tailored_text"]
            .as_str()
            .unwrap()
            .contains("improving delivery speed by 20%"));
        assert_eq!(preview["stage"], "analyzed");
        assert_eq!(preview["job_description"], JD);
    }

    #[tokio::test]
    async fn test_unknown_session_is_gone() {
        let (app, _dir) = app(ScriptedLlm::default());
        let response = app
            .clone()
            .oneshot(json_request(
                "/api/v1/tailor/generate",
                json!({ "session_id": uuid::Uuid::new_v4() }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "SESSION_EXPIRED");
        assert_eq!(
            body["error"]["message"],
            "Session expired or file not found. Please upload again."
        );
    }

    #[tokio::test]
    async fn test_binary_upload_is_unsupported() {
        let (app, _dir) = app(ScriptedLlm::default());
        let response = app
            .oneshot(multipart_request(
                "photo.png",
                &[0x89, b'P', b'N', b'G', 0xff, 0xfe],
                Some(JD),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_missing_job_description_is_rejected() {
        let (app, _dir) = app(ScriptedLlm::default());
        let response = app
            .oneshot(multipart_request("resume.txt", RESUME.as_bytes(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_corrupt_docx_is_unprocessable() {
        let (app, _dir) = app(ScriptedLlm::default());
        let response = app
            .oneshot(multipart_request(
                "resume.docx",
                b"PK\x03\x04 not really a zip",
                Some(JD),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_artifact_is_not_found() {
        let (app, _dir) = app(ScriptedLlm::default());
        let missing = format!(
            "/api/v1/tailor/download/{}-{}.txt",
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4()
        );
        for uri in ["/api/v1/tailor/download/resume.docx".to_string(), missing] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = app(ScriptedLlm::default());
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["service"], "tailor-api");
    }
}
