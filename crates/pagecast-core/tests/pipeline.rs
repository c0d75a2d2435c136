//! End-to-end pipeline tests against in-memory fakes for every
//! external service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use pagecast_core::services::{
    DialogueVoices, DocumentRecord, DocumentStore, DocumentUpdate, GenerationError,
    GenerationRequest, GenerationService, JobDelivery, ObjectStorage, PromptPart, ResultsSink,
    SpeechError, SpeechService, StoreError, VoiceSelection,
};
use pagecast_core::speech::turns::SpeakerTurn;
use pagecast_core::{
    JobError, JobKind, JobOutput, JobQueue, JobRequest, JobState, PageInput, PipelineConfig,
    ScriptStyle, Services, StatusSnapshot,
};

#[derive(Default)]
struct FakeGeneration {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Fail any call whose prompt contains this marker
    fail_marker: Option<String>,
    /// Returned for script-generation prompts
    script_response: Option<String>,
    /// Hold every call open this long (for cancellation tests)
    block: Option<Duration>,
}

#[async_trait]
impl GenerationService for FakeGeneration {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(block) = self.block {
            tokio::time::sleep(block).await;
        }

        let prompt = request
            .parts
            .iter()
            .find_map(|p| match p {
                PromptPart::Text(text) => Some(text.clone()),
                PromptPart::PngImage(_) => None,
            })
            .unwrap_or_default();

        let result = if self
            .fail_marker
            .as_deref()
            .is_some_and(|marker| prompt.contains(marker))
        {
            Err(GenerationError::Service("simulated failure".into()))
        } else if prompt.contains("JSON object") {
            Ok(r#"{"summary": "A document about rivers.", "elevator_pitch": "Rivers, explained."}"#
                .to_string())
        } else if prompt.starts_with("Write the script") {
            Ok(self
                .script_response
                .clone()
                .unwrap_or_else(|| "A calm narration of the page.".to_string()))
        } else {
            Ok("Detailed analysis of the page content.".to_string())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct FakeSpeech {
    single_calls: AtomicUsize,
    dialogue_calls: AtomicUsize,
    dialogue_supported: bool,
}

#[async_trait]
impl SpeechService for FakeSpeech {
    async fn synthesize(&self, _text: &str, _voice: &VoiceSelection) -> Result<Bytes, SpeechError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"AUDIO"))
    }

    async fn synthesize_dialogue(
        &self,
        _turns: &[SpeakerTurn],
        _voices: &DialogueVoices,
    ) -> Result<Bytes, SpeechError> {
        self.dialogue_calls.fetch_add(1, Ordering::SeqCst);
        if self.dialogue_supported {
            Ok(Bytes::from_static(b"DIALOGUE"))
        } else {
            Err(SpeechError::Unsupported)
        }
    }
}

#[derive(Default)]
struct FakeDocs {
    content: Option<String>,
    summary: Option<String>,
    updates: Mutex<Vec<DocumentUpdate>>,
}

#[async_trait]
impl DocumentStore for FakeDocs {
    async fn get_document(&self, document_id: &str) -> Result<DocumentRecord, StoreError> {
        if self.content.is_none() && self.summary.is_none() {
            return Err(StoreError::NotFound(document_id.to_string()));
        }
        Ok(DocumentRecord {
            content: self.content.clone(),
            summary: self.summary.clone(),
        })
    }

    async fn update_document(
        &self,
        _document_id: &str,
        update: DocumentUpdate,
    ) -> Result<(), StoreError> {
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}

#[derive(Default)]
struct FakeStorage {
    uploads: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        self.uploads.lock().unwrap().push((path.to_string(), data.len()));
        Ok(path.to_string())
    }
}

#[derive(Default)]
struct FakeSink {
    deliveries: Mutex<Vec<JobDelivery>>,
}

#[async_trait]
impl ResultsSink for FakeSink {
    async fn deliver(&self, delivery: &JobDelivery) -> anyhow::Result<()> {
        self.deliveries.lock().unwrap().push(delivery.clone());
        Ok(())
    }
}

struct Fixture {
    generation: Arc<FakeGeneration>,
    speech: Arc<FakeSpeech>,
    docs: Arc<FakeDocs>,
    storage: Arc<FakeStorage>,
    sink: Arc<FakeSink>,
    queue: JobQueue,
}

fn fixture(generation: FakeGeneration, speech: FakeSpeech, docs: FakeDocs) -> Fixture {
    let generation = Arc::new(generation);
    let speech = Arc::new(speech);
    let docs = Arc::new(docs);
    let storage = Arc::new(FakeStorage::default());
    let sink = Arc::new(FakeSink::default());

    let services = Services {
        generation: generation.clone(),
        speech: speech.clone(),
        documents: docs.clone(),
        storage: storage.clone(),
        sink: sink.clone(),
    };
    let pipeline = PipelineConfig {
        inter_page_delay: Duration::ZERO,
        inter_chunk_delay: Duration::ZERO,
        generation_timeout: Duration::from_secs(5),
        summary_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let queue = JobQueue::new(services, pipeline);

    Fixture {
        generation,
        speech,
        docs,
        storage,
        sink,
        queue,
    }
}

fn page_images(count: usize) -> Vec<PageInput> {
    (0..count)
        .map(|_| PageInput::from_image(Bytes::from_static(b"PNG")))
        .collect()
}

async fn wait_terminal(queue: &JobQueue, job_id: &str) -> StatusSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(snapshot) = queue.status(job_id).await {
                if snapshot.state.is_terminal() {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

#[tokio::test]
async fn document_job_survives_one_failed_page() {
    let fx = fixture(
        FakeGeneration {
            fail_marker: Some("Analyze page 2".into()),
            ..Default::default()
        },
        FakeSpeech::default(),
        FakeDocs::default(),
    );

    let request = JobRequest {
        job_id: "doc-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::DocumentAnalysis),
        pages: page_images(3),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    let snapshot = wait_terminal(&fx.queue, "doc-job").await;

    let JobState::Success { result } = snapshot.state else {
        panic!("expected success, got {:?}", snapshot.state);
    };
    let JobOutput::Document(report) = result else {
        panic!("expected a document report");
    };

    assert_eq!(report.pages_processed, 3);
    assert!(report.content.contains("Page 1 Analysis"));
    assert!(report.content.contains("Page 2 Analysis\n[Analysis failed: simulated failure]"));
    assert!(report.content.contains("Page 3 Analysis"));
    assert_eq!(report.summary, "A document about rivers.");

    // Result was delivered to the sink as completed.
    let deliveries = fx.sink.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, "completed");
    assert_eq!(deliveries[0].user_id, "user-1");
}

#[tokio::test]
async fn pages_are_analyzed_one_at_a_time() {
    let fx = fixture(
        FakeGeneration {
            block: Some(Duration::from_millis(20)),
            ..Default::default()
        },
        FakeSpeech::default(),
        FakeDocs::default(),
    );

    let request = JobRequest {
        job_id: "seq-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::DocumentAnalysis),
        pages: page_images(4),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    wait_terminal(&fx.queue, "seq-job").await;

    // 4 page calls plus the summary call, never more than one in flight.
    assert_eq!(fx.generation.calls.load(Ordering::SeqCst), 5);
    assert_eq!(fx.generation.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn audio_job_narrates_unmarked_document_as_one_page() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech {
            dialogue_supported: true,
            ..Default::default()
        },
        FakeDocs {
            content: Some("Plain stored analysis with no page markers at all.".into()),
            ..Default::default()
        },
    );

    let request = JobRequest {
        job_id: "audio-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::AudioGeneration),
        document_id: Some("doc-1".into()),
        audio_style: Some(ScriptStyle::SingleSpeaker),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    let snapshot = wait_terminal(&fx.queue, "audio-job").await;

    let JobState::Success { result } = snapshot.state else {
        panic!("expected success, got {:?}", snapshot.state);
    };
    let JobOutput::Audio(artifact) = result else {
        panic!("expected an audio artifact");
    };

    assert_eq!(artifact.pages_processed, 1);
    assert!(artifact.storage_path.starts_with("audio/doc-1-single-"));
    assert!(artifact.storage_path.ends_with(".mp3"));

    // One script generation, one synthesis call, one non-empty upload.
    assert_eq!(fx.generation.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.speech.single_calls.load(Ordering::SeqCst), 1);
    let uploads = fx.storage.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].1 > 0);

    // Document record now points at the narration.
    let updates = fx.docs.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].summary_audio_url.as_deref(), Some(uploads[0].0.as_str()));
    assert!(updates[0].reading_companion_audio_url.is_none());
}

#[tokio::test]
async fn podcast_job_falls_back_when_dialogue_synthesis_is_unsupported() {
    let fx = fixture(
        FakeGeneration {
            script_response: Some("A: Welcome to the show.\nB: Glad to be here.".into()),
            ..Default::default()
        },
        FakeSpeech {
            dialogue_supported: false,
            ..Default::default()
        },
        FakeDocs {
            content: Some("Page 1 Analysis\nAn analyzed first page.".into()),
            ..Default::default()
        },
    );

    let request = JobRequest {
        job_id: "podcast-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::AudioGeneration),
        document_id: Some("doc-2".into()),
        audio_style: Some(ScriptStyle::TwoSpeakerPodcast),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    let snapshot = wait_terminal(&fx.queue, "podcast-job").await;
    assert!(matches!(snapshot.state, JobState::Success { .. }));

    // Native dialogue was attempted once, then each turn got its own voice.
    assert_eq!(fx.speech.dialogue_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.speech.single_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reading_job_skips_script_generation() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech::default(),
        FakeDocs {
            content: Some("Stored text that should be read aloud verbatim.".into()),
            ..Default::default()
        },
    );

    let request = JobRequest {
        job_id: "reading-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::ReadingAudioGeneration),
        document_id: Some("doc-3".into()),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    let snapshot = wait_terminal(&fx.queue, "reading-job").await;
    assert!(matches!(snapshot.state, JobState::Success { .. }));

    // No generation calls at all; the stored text is spoken directly.
    assert_eq!(fx.generation.calls.load(Ordering::SeqCst), 0);
    assert!(fx.speech.single_calls.load(Ordering::SeqCst) >= 1);

    let updates = fx.docs.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].reading_companion_audio_url.is_some());
    assert!(updates[0].summary_audio_url.is_none());
    let path = updates[0].reading_companion_audio_url.as_deref().unwrap();
    assert!(path.contains("-reading-"));
}

#[tokio::test]
async fn audio_job_fails_for_missing_document() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech::default(),
        FakeDocs::default(), // no content, no summary: NotFound
    );

    let request = JobRequest {
        job_id: "missing-doc".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::AudioGeneration),
        document_id: Some("ghost".into()),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    let snapshot = wait_terminal(&fx.queue, "missing-doc").await;

    let JobState::Failure { error } = snapshot.state else {
        panic!("expected failure, got {:?}", snapshot.state);
    };
    assert!(matches!(error, JobError::InvalidInput(_)));
    assert!(fx.storage.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_submission_is_rejected_synchronously() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech::default(),
        FakeDocs::default(),
    );

    let request = JobRequest {
        job_id: "bad-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::DocumentAnalysis),
        ..Default::default()
    };
    let err = fx.queue.submit(request).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidInput(_)));
    assert!(fx.queue.status("bad-job").await.is_none());
}

#[tokio::test]
async fn cancelling_a_running_job_terminates_its_units() {
    let fx = fixture(
        FakeGeneration {
            block: Some(Duration::from_secs(60)),
            ..Default::default()
        },
        FakeSpeech::default(),
        FakeDocs::default(),
    );

    let request = JobRequest {
        job_id: "cancel-me".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::DocumentAnalysis),
        pages: page_images(3),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();

    // Let the first page start, then cancel with all 3 units outstanding.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.queue.cancel("cancel-me").await, 3);

    let snapshot = wait_terminal(&fx.queue, "cancel-me").await;
    let JobState::Failure { error } = snapshot.state else {
        panic!("expected failure, got {:?}", snapshot.state);
    };
    assert_eq!(error, JobError::Cancelled);
    assert!(fx.queue.list_active().await.is_empty());

    let report = fx.queue.monitor().job_progress("cancel-me").await;
    assert_eq!(report.state, "failure");
    assert_eq!(report.outstanding_units, 0);
}

#[tokio::test]
async fn cancelling_an_unknown_job_returns_zero() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech::default(),
        FakeDocs::default(),
    );
    assert_eq!(fx.queue.cancel("never-submitted").await, 0);
}

#[tokio::test]
async fn finished_jobs_are_immune_to_late_cancellation() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech::default(),
        FakeDocs::default(),
    );

    let request = JobRequest {
        job_id: "done-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::DocumentAnalysis),
        pages: page_images(1),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    wait_terminal(&fx.queue, "done-job").await;

    assert_eq!(fx.queue.cancel("done-job").await, 0);
    let snapshot = fx.queue.status("done-job").await.unwrap();
    assert!(matches!(snapshot.state, JobState::Success { .. }));
}

#[tokio::test]
async fn fallback_text_analysis_runs_as_a_single_unit() {
    let fx = fixture(
        FakeGeneration::default(),
        FakeSpeech::default(),
        FakeDocs::default(),
    );

    let request = JobRequest {
        job_id: "text-job".into(),
        user_id: "user-1".into(),
        kind: Some(JobKind::DocumentAnalysis),
        fallback_text: Some("Extracted document text when rendering failed.".into()),
        ..Default::default()
    };
    fx.queue.submit(request).await.unwrap();
    let snapshot = wait_terminal(&fx.queue, "text-job").await;

    let JobState::Success { result } = snapshot.state else {
        panic!("expected success, got {:?}", snapshot.state);
    };
    let JobOutput::Document(report) = result else {
        panic!("expected a document report");
    };
    assert_eq!(report.pages_processed, 1);
    assert!(report.content.contains("Page 1 Analysis"));
}
