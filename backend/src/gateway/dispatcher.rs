//! Per-request dispatch: validate, moderate, admit, resolve, send, relay.

use std::io;
use std::sync::Arc;

use futures_util::TryStreamExt;
use tokio::io::AsyncWrite;
use tokio_util::io::StreamReader;
use tracing::Instrument;
use uuid::Uuid;

use model_gateway_common::{QuestionParameters, WorkerGenerateRequest};

use super::admission::AdmissionController;
use super::directory::{DirectoryError, WorkerDirectory};
use super::relay::StreamRelay;
use super::transport::RetryingTransport;
use crate::config::ChatConfig;
use crate::error::Result;
use crate::models::question::{ModelName, Question};
use crate::moderation::Moderation;

pub struct Dispatcher {
    directory: Arc<WorkerDirectory>,
    admission: AdmissionController,
    moderation: Arc<dyn Moderation>,
    transport: RetryingTransport,
    max_length_of_question: usize,
    worker_path: String,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<WorkerDirectory>,
        moderation: Arc<dyn Moderation>,
        config: &ChatConfig,
    ) -> Result<Self> {
        let transport = RetryingTransport::new(config.timeout(), config.max_retries)?;

        Ok(Self {
            directory,
            admission: AdmissionController::new(config.max_concurrent),
            moderation,
            transport,
            max_length_of_question: config.max_length_of_question,
            worker_path: config.worker_path.clone(),
        })
    }

    /// Answer `question` with `model_name`, streaming the worker's bytes into `sink`.
    ///
    /// Nothing is written to `sink` unless the request passed validation,
    /// moderation and admission and the worker accepted it.
    pub async fn ask<W>(
        &self,
        question: &str,
        model_name: &str,
        parameters: QuestionParameters,
        sink: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let span = tracing::info_span!(
            "dispatch",
            request_id = %Uuid::new_v4(),
            model = %model_name,
        );

        self.admit_and_dispatch(question, model_name, parameters, sink)
            .instrument(span)
            .await
    }

    async fn admit_and_dispatch<W>(
        &self,
        question: &str,
        model_name: &str,
        parameters: QuestionParameters,
        sink: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let question = Question::parse(question, self.max_length_of_question)?;
        let model = ModelName::parse(model_name, &*self.directory)?;

        self.moderation.check_text(question.as_str()).await?;

        self.admission
            .admit(|| self.dispatch(question, model, parameters, sink))
            .await
    }

    async fn dispatch<W>(
        &self,
        question: Question,
        model: ModelName,
        parameters: QuestionParameters,
        sink: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let address = self
            .directory
            .worker_address(model.as_str())
            .ok_or_else(|| DirectoryError::UnknownModel(model.as_str().to_string()))?;
        let url = format!("{}{}", address, self.worker_path);

        let payload = WorkerGenerateRequest {
            models: model.as_str().to_string(),
            prompt: question.into_inner(),
            parameters,
        };

        tracing::debug!(url = %url, "Dispatching to worker");
        let response = self.transport.post_stream(&url, Some(&payload)).await?;

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut relay = StreamRelay::new(StreamReader::new(body));
        while !relay.relay_once(sink).await? {}

        tracing::info!(bytes = relay.relayed_bytes(), "Dispatch completed");
        Ok(())
    }

    pub fn all_models(&self) -> Vec<String> {
        self.directory.all_models()
    }

    pub fn is_valid_model_name(&self, name: &str) -> bool {
        !name.is_empty() && self.directory.has_model(name)
    }

    pub fn max_length_of_question(&self) -> usize {
        self.max_length_of_question
    }

    pub fn directory(&self) -> &Arc<WorkerDirectory> {
        &self.directory
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("admission", &self.admission)
            .field("max_length_of_question", &self.max_length_of_question)
            .field("worker_path", &self.worker_path)
            .finish_non_exhaustive()
    }
}
