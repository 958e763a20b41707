//! Structural PDF edits: merging several documents, reordering pages and
//! recompressing streams.

use lopdf::{dictionary, Document, Object, ObjectId};
use serde::Deserialize;

use super::pdf::{is_pdf, load_document, save_document};
use crate::file::ManagedFile;
use crate::plugin::{NoParams, Plugin, PluginError};
use crate::status::FileProcess;

const DEFAULT_MERGED_NAME: &str = "merged.pdf";

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

fn structure_error(file: &str, e: lopdf::Error) -> PluginError {
    PluginError::Decode {
        file: file.to_string(),
        reason: e.to_string(),
    }
}

/// Inherited attributes the page itself does not set, nearest ancestor first.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let mut found = Vec::new();
    let Ok(page) = doc.get_dictionary(page_id) else {
        return found;
    };
    let mut missing: Vec<&[u8]> = INHERITABLE.iter().copied().filter(|k| !page.has(k)).collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    // Bounded walk; malformed files can contain Parent cycles.
    for _ in 0..64 {
        let Some(node) = parent.and_then(|id| doc.get_dictionary(id).ok()) else {
            break;
        };
        if missing.is_empty() {
            break;
        }
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    found
}

/// Makes `pages` direct children of `parent_id`, copying down whatever they
/// inherited from the tree they came from.
fn adopt_pages(doc: &mut Document, pages: &[ObjectId], parent_id: ObjectId) -> lopdf::Result<()> {
    for &page_id in pages {
        let inherited = inherited_attributes(doc, page_id);
        let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        for (key, value) in inherited {
            page.set(key, value);
        }
        page.set("Parent", parent_id);
    }
    Ok(())
}

fn is_tree_node(object: &Object) -> bool {
    let Object::Dictionary(dict) = object else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(name) if name == b"Catalog" || name == b"Pages"
    )
}

/// Concatenates the pages of `documents` under a fresh flat page tree.
fn merge_documents(documents: Vec<Document>) -> lopdf::Result<Document> {
    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for mut doc in documents {
        doc.renumber_objects_with(merged.max_id + 1);
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        adopt_pages(&mut doc, &pages, pages_id)?;
        kids.extend(pages.into_iter().map(Object::Reference));

        for (id, object) in doc.objects {
            if is_tree_node(&object) {
                continue;
            }
            merged.max_id = merged.max_id.max(id.0);
            merged.objects.insert(id, object);
        }
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.prune_objects();
    merged.renumber_objects();
    Ok(merged)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdfMergeParams {
    /// Name of the merged file. Defaults to `merged.pdf`.
    pub file_name: Option<String>,
    /// File names to merge, in order. Empty merges every PDF in input order;
    /// otherwise PDFs not listed pass through untouched.
    #[serde(default)]
    pub order: Vec<String>,
}

/// Collapses several PDFs into one. The merged file takes the place of the
/// first merged input and inherits its metadata.
pub struct PdfMerge;

impl Plugin for PdfMerge {
    type Params = PdfMergeParams;

    fn name(&self) -> &str {
        "PdfMerge"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &PdfMergeParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let selected = select_merge_inputs(&files, &params.order)?;
        let Some(&position) = selected.iter().min() else {
            return Ok(files);
        };
        let _span = tracing::info_span!("plugin.pdf_merge", inputs = selected.len()).entered();
        super::report(process, self.name(), format!("Merging {} PDF file(s)", selected.len()));

        let mut slots: Vec<Option<ManagedFile>> = files.into_iter().map(Some).collect();
        let mut inputs: Vec<ManagedFile> = selected.iter().filter_map(|&i| slots[i].take()).collect();

        let mut documents = Vec::with_capacity(inputs.len());
        for file in &mut inputs {
            documents.push(load_document(file)?);
        }

        let file_name = params
            .file_name
            .clone()
            .unwrap_or_else(|| DEFAULT_MERGED_NAME.to_string());
        let mut merged =
            merge_documents(documents).map_err(|e| structure_error(&file_name, e))?;
        let page_count = merged.get_pages().len();
        let bytes = save_document(&mut merged, &file_name)?;

        let mut output = ManagedFile::from_bytes(file_name, "application/pdf", bytes);
        if let Some(first) = inputs.first() {
            output.metadata = first.metadata.clone();
        }
        output.processing_errors = inputs
            .iter()
            .flat_map(|f| f.processing_errors.iter().cloned())
            .collect();
        output.set_metadata("page_count", page_count);
        output.set_metadata(
            "merged_from",
            inputs.iter().map(|f| f.file_name.clone()).collect::<Vec<_>>(),
        );

        slots[position] = Some(output);
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Indices of the PDFs to merge, in merge order.
fn select_merge_inputs(files: &[ManagedFile], order: &[String]) -> Result<Vec<usize>, PluginError> {
    if order.is_empty() {
        return Ok((0..files.len()).filter(|&i| is_pdf(&files[i])).collect());
    }

    let mut selected: Vec<usize> = Vec::with_capacity(order.len());
    for name in order {
        let index = (0..files.len())
            .find(|&i| files[i].file_name == *name && is_pdf(&files[i]) && !selected.contains(&i))
            .ok_or_else(|| PluginError::Failed(format!("merge file not found: {}", name)))?;
        selected.push(index);
    }
    Ok(selected)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdfReorderParams {
    /// 1-based page numbers in their new order. Pages not listed are dropped.
    #[serde(default)]
    pub page_order: Vec<u32>,
}

/// Rewrites the page order of each PDF.
pub struct PdfReorder;

impl Plugin for PdfReorder {
    type Params = PdfReorderParams;

    fn name(&self) -> &str {
        "PdfReorder"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        params: &PdfReorderParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        if params.page_order.is_empty() {
            return Err(PluginError::Failed(
                "page_order must list at least one page".to_string(),
            ));
        }

        let mut processed = Vec::with_capacity(files.len());
        for mut file in files {
            if !is_pdf(&file) {
                processed.push(file);
                continue;
            }
            super::report(process, self.name(), format!("Reordering pages: {}", file.file_name));

            let mut doc = load_document(&mut file)?;
            let pages = doc.get_pages();
            let mut order: Vec<ObjectId> = Vec::with_capacity(params.page_order.len());
            for &number in &params.page_order {
                let id = pages.get(&number).copied().ok_or_else(|| {
                    PluginError::Failed(format!(
                        "invalid page number: {} ({} pages)",
                        number,
                        pages.len()
                    ))
                })?;
                if order.contains(&id) {
                    return Err(PluginError::Failed(format!(
                        "page {} listed more than once",
                        number
                    )));
                }
                order.push(id);
            }

            let file_name = file.file_name.clone();
            set_page_order(&mut doc, &order).map_err(|e| structure_error(&file_name, e))?;
            doc.prune_objects();
            let bytes = save_document(&mut doc, &file_name)?;

            file.local_path = None;
            file.size = bytes.len() as u64;
            file.set_metadata("page_count", order.len());
            file.content = Some(bytes);
            processed.push(file);
        }
        Ok(processed)
    }
}

fn set_page_order(doc: &mut Document, order: &[ObjectId]) -> lopdf::Result<()> {
    let root_id = doc.trailer.get(b"Root").and_then(Object::as_reference)?;
    let pages_id = doc
        .get_dictionary(root_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)?;

    adopt_pages(doc, order, pages_id)?;
    let kids: Vec<Object> = order.iter().copied().map(Object::Reference).collect();
    let tree = doc.get_object_mut(pages_id).and_then(Object::as_dict_mut)?;
    tree.set("Kids", kids);
    tree.set("Count", order.len() as i64);
    Ok(())
}

/// Drops unreachable objects and empty streams and deflates the rest.
pub struct PdfCompress;

impl Plugin for PdfCompress {
    type Params = NoParams;

    fn name(&self) -> &str {
        "PdfCompress"
    }

    fn process(
        &self,
        files: Vec<ManagedFile>,
        _params: &NoParams,
        process: &mut FileProcess,
    ) -> Result<Vec<ManagedFile>, PluginError> {
        let mut processed = Vec::with_capacity(files.len());
        for mut file in files {
            if !is_pdf(&file) {
                processed.push(file);
                continue;
            }
            super::report(process, self.name(), format!("Compressing PDF: {}", file.file_name));

            let mut doc = load_document(&mut file)?;
            let original_size = file.content.as_ref().map_or(file.size, |c| c.len() as u64);
            doc.prune_objects();
            doc.delete_zero_length_streams();
            doc.compress();
            let bytes = save_document(&mut doc, &file.file_name)?;

            tracing::debug!(before = original_size, after = bytes.len(), "Compressed PDF");
            file.local_path = None;
            file.size = bytes.len() as u64;
            file.set_metadata("original_size", original_size);
            file.content = Some(bytes);
            processed.push(file);
        }
        Ok(processed)
    }
}
