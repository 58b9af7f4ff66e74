use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use seeker_llm::{ChatClient, ChatMessage, ChatOptions, StreamChunk};
use seeker_types::{
    AnalysisResult, Citation, EventSink, Fact, ProgressPayload, Report, ResearchEvent, SessionId,
};

use crate::{Error, Result, ask_structured, prompts};

pub const MIN_SECTIONS: usize = 4;
pub const MAX_SECTIONS: usize = 7;
const MAX_SECTION_RETRIES: u32 = 2;
const SUMMARY_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct OutlineResponse {
    title: String,
    #[serde(default)]
    summary: String,
    sections: Vec<SectionSpec>,
}

#[derive(Debug, Deserialize)]
struct SectionSpec {
    heading: String,
    #[serde(default)]
    key_points: Vec<String>,
}

/// Outline generation, per-section writing and citation assembly.
pub struct SynthesisAgent {
    client: Arc<dyn ChatClient>,
    sink: Arc<dyn EventSink>,
    session_id: SessionId,
}

impl SynthesisAgent {
    pub fn new(
        client: Arc<dyn ChatClient>,
        sink: Arc<dyn EventSink>,
        session_id: SessionId,
    ) -> Self {
        Self {
            client,
            sink,
            session_id,
        }
    }

    pub async fn run(
        &self,
        topic: &str,
        facts: &[Fact],
        analysis: Option<&AnalysisResult>,
        sources: &[String],
        cancel: &CancellationToken,
    ) -> Result<Report> {
        self.emit(ProgressPayload::SynthesisStarted {});

        let outline = self.outline(topic, analysis, cancel).await?;
        let numbered_sources = number_sources(sources);

        let mut body = String::new();
        let total = outline.sections.len();
        for (index, section) in outline.sections.iter().enumerate() {
            self.emit(ProgressPayload::SynthesisProgress {
                section: section.heading.clone(),
                written: index,
                total,
            });
            let text = self
                .write_section(topic, section, &numbered_sources, facts, index, cancel)
                .await?;
            body.push_str(&format!("## {}\n\n{}\n\n", section.heading, text.trim()));
        }

        let (full_content, citations) = assemble_citations(
            &format!("# {}\n\n{}", outline.title, body.trim_end()),
            sources,
        );

        self.emit(ProgressPayload::SynthesisComplete {
            section_count: total,
        });

        let mut summary = outline.summary;
        summary.truncate(floor_char_boundary(&summary, SUMMARY_LIMIT));

        Ok(Report {
            title: outline.title,
            summary,
            full_content,
            citations,
        })
    }

    async fn outline(
        &self,
        topic: &str,
        analysis: Option<&AnalysisResult>,
        cancel: &CancellationToken,
    ) -> Result<OutlineResponse> {
        let empty_facts = Vec::new();
        let empty_contradictions = Vec::new();
        let (validated, contradictions) = match analysis {
            Some(a) => (&a.validated_facts, &a.contradictions),
            None => (&empty_facts, &empty_contradictions),
        };
        let prompt = prompts::outline(topic, validated, contradictions);
        let options = ChatOptions::scoped("synthesis/outline").with_temperature(0.4);

        let mut outline: OutlineResponse = ask_structured(
            self.client.as_ref(),
            &[ChatMessage::user(prompt)],
            &options,
            r#"{"title": "...", "summary": "...", "sections": [{"heading": "...", "key_points": ["..."]}]}"#,
            cancel,
        )
        .await?;

        if outline.sections.is_empty() {
            return Err(Error::Malformed("outline produced no sections".to_string()));
        }
        outline.sections.truncate(MAX_SECTIONS);
        Ok(outline)
    }

    /// Write one section, re-prompting the failing section with a
    /// tightened instruction before surfacing.
    async fn write_section(
        &self,
        topic: &str,
        section: &SectionSpec,
        numbered_sources: &str,
        facts: &[Fact],
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut last_error = String::new();
        for attempt in 0..=MAX_SECTION_RETRIES {
            let strict = attempt > 0;
            let prompt = prompts::write_section(
                topic,
                &section.heading,
                &section.key_points,
                numbered_sources,
                facts,
                strict,
            );
            let scope = format!("synthesis/section-{index}");
            let options = ChatOptions::scoped(&scope).with_temperature(0.4);

            let sink = self.sink.clone();
            let session_id = self.session_id;
            let chunk_scope = scope.clone();
            let mut on_chunk = move |chunk: StreamChunk| {
                sink.emit(ResearchEvent::new(
                    session_id,
                    ProgressPayload::LlmChunk {
                        worker: None,
                        scope: chunk_scope.clone(),
                        text: chunk.text,
                        done: chunk.done,
                    },
                ));
            };

            match self
                .client
                .stream_chat(&[ChatMessage::user(prompt)], &options, cancel, &mut on_chunk)
                .await
            {
                Ok(response) if !response.message.content.trim().is_empty() => {
                    return Ok(response.message.content);
                }
                Ok(_) => last_error = "empty section body".to_string(),
                Err(err) => {
                    if matches!(err, seeker_llm::Error::Cancelled) {
                        return Err(err.into());
                    }
                    last_error = err.to_string();
                }
            }
            tracing::debug!(section = %section.heading, attempt, "section write retry");
        }

        Err(Error::SectionFailed {
            section: section.heading.clone(),
            reason: last_error,
        })
    }

    fn emit(&self, payload: ProgressPayload) {
        self.sink.emit(ResearchEvent::new(self.session_id, payload));
    }
}

fn number_sources(sources: &[String]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, url)| format!("{}. {url}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renumber `[n]` markers in first-appearance order and build the final
/// citation list. Markers outside the source list are left untouched.
fn assemble_citations(content: &str, sources: &[String]) -> (String, Vec<Citation>) {
    let marker = Regex::new(r"\[(\d+)\]").expect("static regex");

    // First pass: canonical id per provisional marker, in appearance order.
    let mut canonical: HashMap<usize, usize> = HashMap::new();
    let mut citations: Vec<Citation> = Vec::new();
    for capture in marker.captures_iter(content) {
        let provisional: usize = match capture[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if provisional == 0 || provisional > sources.len() {
            continue;
        }
        if !canonical.contains_key(&provisional) {
            let id = citations.len() + 1;
            canonical.insert(provisional, id);
            citations.push(Citation {
                id,
                url: sources[provisional - 1].clone(),
                title: None,
            });
        }
    }

    // Second pass: rewrite markers to canonical ids.
    let rewritten = marker.replace_all(content, |caps: &regex::Captures<'_>| {
        match caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|p| canonical.get(&p))
        {
            Some(id) => format!("[{id}]"),
            None => caps[0].to_string(),
        }
    });

    (rewritten.into_owned(), citations)
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}
