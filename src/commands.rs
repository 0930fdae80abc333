use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info};

use crate::config::Config;
use crate::course::{CourseContent, CourseId};
use crate::service::CourseRag;
use crate::{CourseRagError, Result};


/// Load configuration from `config_dir` and build the service
#[inline]
pub async fn load_service(config_dir: &Path) -> Result<CourseRag> {
    let config = Config::load(config_dir).map_err(|e| CourseRagError::Config(format!("{:#}", e)))?;
    CourseRag::from_config(&config).await
}

/// Read course content from a JSON or TOML file, chosen by extension
#[inline]
pub fn read_course_content(path: &Path) -> Result<CourseContent> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read course file: {}", path.display()))?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let content: CourseContent = if is_toml {
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse course file: {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse course file: {}", path.display()))?
    };

    content.validate()?;
    Ok(content)
}

/// Index a course, showing batch progress; Ctrl+C stops between requests
#[inline]
pub async fn ingest_course(service: &CourseRag, course: &CourseId, content: &CourseContent) -> Result<()> {
    ingest_course_until(service, course, content, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Index a course until `shutdown` resolves; an interrupted run is recorded as failed
#[inline]
pub async fn ingest_course_until<S>(
    service: &CourseRag,
    course: &CourseId,
    content: &CourseContent,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    let plan = service.plan_course(course, content)?;
    println!(
        "Indexing course {} ({} chunks)",
        course,
        plan.len()
    );

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(plan.len() as u64).with_style(
            ProgressStyle::with_template("{bar:40} [{pos}/{len}] chunks {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    let stored = Arc::new(AtomicUsize::new(0));
    let progress_stored = Arc::clone(&stored);
    let progress_bar = bar.clone();
    let ingestion = service.ingest_plan(plan, move |progress| {
        progress_stored.store(progress.chunks_stored, Ordering::SeqCst);
        progress_bar.set_position(progress.chunks_stored as u64);
        progress_bar.set_message(format!("batch {}/{}", progress.batch, progress.batches));
    });

    tokio::select! {
        result = ingestion => {
            bar.finish_and_clear();
            match result {
                Ok(report) => {
                    info!("Ingestion of {} finished", course);
                    println!(
                        "✅ Stored {} chunks in {} batches (collection '{}')",
                        report.chunks_stored, report.batches, report.collection_name
                    );
                    Ok(())
                }
                Err(e) => {
                    error!("Ingestion failed: {}", e);
                    println!("❌ {}", e.user_message());
                    Err(e)
                }
            }
        }
        () = shutdown => {
            bar.abandon();
            let error = service
                .record_interrupted(course, stored.load(Ordering::SeqCst))
                .await;
            println!("\n📴 {}", error.user_message());
            Err(error)
        }
    }
}

/// Print an answer, or the generic unavailable message when generation fails
#[inline]
pub async fn ask_question(service: &CourseRag, course: &CourseId, question: &str) -> Result<()> {
    match service.answer_question(course, question).await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e @ CourseRagError::InvalidInput(_)) => Err(e),
        Err(e) => {
            error!("Answer generation failed: {}", e);
            println!("{}", e.user_message());
            Ok(())
        }
    }
}

#[inline]
pub async fn search_course(
    service: &CourseRag,
    course: &CourseId,
    question: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let result = service.search_course(course, question, top_k).await?;

    if result.is_empty() {
        println!("No indexed content found for course {}.", course);
        println!("Use 'course-rag ingest {}' to index it.", course);
        return Ok(());
    }

    for (rank, found) in result.matches.iter().enumerate() {
        println!(
            "{}. [{}] similarity {:.3}",
            rank + 1,
            found.id,
            found.similarity
        );
        if let Some(text) = &found.document {
            println!("   {}", text);
        }
    }

    Ok(())
}

#[inline]
pub async fn show_course_info(service: &CourseRag, course: &CourseId) -> Result<()> {
    let info = service.course_index_info(course).await?;

    println!("📚 Course {}", info.course_id);
    println!("   Collection: {}", info.collection_name);
    println!("   Stored Chunks: {}", info.chunk_count);

    match info.record {
        Some(record) => {
            println!("   Status: {}", record.status);
            println!(
                "   Last Run: {}/{} chunks",
                record.chunks_stored, record.chunks_total
            );
            if let Some(indexed) = record.indexed_date {
                println!("   Indexed: {}", indexed.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(message) = &record.error_message {
                println!("   Last Error: {}", message);
            }
            if record.is_partial() {
                println!("   ⚠️  Partially indexed; run ingest again to complete it.");
            }
        }
        None => println!("   Status: unknown (no ledger entry)"),
    }

    Ok(())
}

#[inline]
pub async fn delete_course(service: &CourseRag, course: &CourseId) -> Result<()> {
    service.delete_course_index(course).await?;
    println!("🗑️  Deleted index for course {}", course);
    Ok(())
}

#[inline]
pub async fn list_courses(service: &CourseRag) -> Result<()> {
    let courses = service.list_courses().await?;

    if courses.is_empty() {
        println!("No courses have been indexed yet.");
        println!("Use 'course-rag ingest <course-id>' to index one.");
        return Ok(());
    }

    println!("Courses ({} total):", courses.len());
    println!();

    for course in &courses {
        let status = course
            .status
            .map_or_else(|| "unknown".to_string(), |status| status.to_string());
        let stored = match (course.chunks_stored, course.chunks_total) {
            (Some(stored), Some(total)) => format!("{}/{} chunks", stored, total),
            _ => "no ledger entry".to_string(),
        };
        let marker = if course.indexed { "📚" } else { "⚪" };
        println!("{} {}  {}  {}", marker, course.course_id, status, stored);
    }

    Ok(())
}

#[inline]
pub async fn health_check(service: &CourseRag) -> Result<()> {
    service.health_check().await?;
    println!("✅ Vector store is reachable");
    Ok(())
}
