//! PDF fixtures built in memory with lopdf, plus stub services.

use crate::error::ServiceError;
use crate::traits::{ChatModel, Embedder};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One page per entry; an empty entry produces a page without any text operator.
pub fn pdf_bytes(pages: &[&str]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![40.into(), 800.into()]),
        ];
        if !text.is_empty() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

pub fn write_pdf(path: &Path, pages: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, pdf_bytes(pages)?)?;
    Ok(())
}

/// Embeds every text as a one-dimensional vector holding its char count.
/// Rejects blank text the way the hosted service client does.
#[derive(Debug, Default)]
pub struct LengthEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for LengthEmbedder {
    fn id(&self) -> String {
        "length".to_string()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidInput("cannot embed empty text".to_string()));
        }
        Ok(vec![text.chars().count() as f32])
    }
}

/// Always fails with a non-transient status.
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn id(&self) -> String {
        "failing".to_string()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
        Err(ServiceError::Status {
            service: "stub".to_string(),
            status: 403,
            details: "quota exhausted".to_string(),
        })
    }
}

/// Records prompts and replies with a fixed answer.
#[derive(Debug, Default)]
pub struct EchoModel {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok("stub answer".to_string())
    }
}

/// Generation always fails with a non-transient status.
#[derive(Debug, Default)]
pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Status {
            service: "stub".to_string(),
            status: 400,
            details: "prompt rejected".to_string(),
        })
    }
}
