//! In-memory document graph
//!
//! A [`Document`] owns the input bytes, the merged cross-reference table and
//! the trailer, and loads indirect objects lazily into an arena keyed by
//! [`ObjectId`]. Reference resolution is lenient in one place only:
//! [`Document::resolve`] never fails and hands out `null` for anything
//! missing, free, unreadable or cyclic.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdflin::parser::ParseOptions;
//! use pdflin::Document;
//!
//! # fn main() -> pdflin::Result<()> {
//! let mut document = Document::open("input.pdf", &ParseOptions::default())?;
//! for (index, page) in document.page_ids().into_iter().enumerate() {
//!     println!("page {} is object {}", index + 1, page);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{PdfError, Result};
use crate::linearization::check;
use crate::parser::header::{PdfHeader, PdfVersion};
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{
    LengthResolver, ObjectId, ObjectParser, PdfArray, PdfDictionary, PdfName, PdfObject,
};
use crate::parser::stack_safe::StackSafeContext;
use crate::parser::trailer::PdfTrailer;
use crate::parser::xref::{self, XRefEntry, XRefTable};
use crate::parser::ParseOptions;
use crate::recovery::XRefRecovery;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

static NULL_OBJECT: PdfObject = PdfObject::Null;

/// Page attributes a page inherits from its ancestors in the page tree
const INHERITABLE_ATTRIBUTES: &[&str] = &["Resources", "MediaBox", "CropBox", "Rotate"];

/// A parsed PDF document with lazily loaded objects
#[derive(Debug)]
pub struct Document {
    data: Vec<u8>,
    version: PdfVersion,
    options: ParseOptions,
    xref: XRefTable,
    trailer: PdfTrailer,
    root: ObjectId,
    rebuilt: bool,
    objects: HashMap<ObjectId, PdfObject>,
    /// Objects whose loading is in progress
    loading: HashSet<ObjectId>,
    /// Decoded object streams; `None` marks one that could not be read
    object_streams: HashMap<u32, Option<ObjectStream>>,
    /// Full-scan index, built the first time a recorded offset is stale
    scan_index: Option<XRefTable>,
    warnings: Vec<String>,
}

impl Document {
    /// Read and load a file
    pub fn open(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::load(data, options)
    }

    /// Load a document from bytes: header, cross-reference data (rebuilt
    /// when necessary), then the catalog.
    pub fn load(data: Vec<u8>, options: &ParseOptions) -> Result<Self> {
        let header = PdfHeader::parse(&data, options)?;
        let data = if header.offset > 0 {
            data[header.offset..].to_vec()
        } else {
            data
        };

        let resolved =
            xref::resolve(&data, options).map_err(|e| PdfError::RebuildRequired(e.to_string()))?;

        let mut document = Self::build(data, resolved.table, resolved.trailer, options)?;
        if header.offset > 0 {
            document.warn(format!(
                "ignored {} bytes before the PDF header",
                header.offset
            ));
        }
        if resolved.rebuilt {
            document.rebuilt = true;
            document.warn("cross-reference table was damaged and has been rebuilt".to_string());
        }
        Ok(document)
    }

    /// Assemble a document from already resolved cross-reference data
    pub fn build(
        data: Vec<u8>,
        xref: XRefTable,
        trailer: PdfTrailer,
        options: &ParseOptions,
    ) -> Result<Self> {
        if trailer.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        let version = match PdfHeader::parse(&data, options) {
            Ok(header) => header.version,
            Err(e) if options.lenient_syntax => {
                warn!("No usable header ({}); assuming PDF 1.4", e);
                PdfVersion::new(1, 4)
            }
            Err(e) => return Err(e.into()),
        };
        let root = trailer.root().map_err(|_| PdfError::MissingRoot)?;

        let mut document = Self {
            data,
            version,
            options: options.clone(),
            xref,
            trailer,
            root,
            rebuilt: false,
            objects: HashMap::new(),
            loading: HashSet::new(),
            object_streams: HashMap::new(),
            scan_index: None,
            warnings: Vec::new(),
        };

        let pages = document
            .catalog()?
            .get("Pages")
            .and_then(|pages| pages.as_reference());
        match pages {
            Some(pages) if matches!(document.resolve(pages), PdfObject::Dictionary(_)) => {}
            _ => document.warn("catalog has no usable /Pages tree".to_string()),
        }

        info!(
            "Loaded PDF {} with {} cross-reference entries",
            document.version,
            document.xref.len()
        );
        Ok(document)
    }

    /// Resolve a reference to its object. Missing, free, unreadable and
    /// cyclic targets resolve to `null`; reference-to-reference chains are
    /// followed up to the configured number of hops.
    pub fn resolve(&mut self, id: ObjectId) -> &PdfObject {
        match self.follow_chain(id) {
            Some(target) => self.objects.get(&target).unwrap_or(&NULL_OBJECT),
            None => &NULL_OBJECT,
        }
    }

    /// Id of the object a chain of references starting at `id` ends at
    fn follow_chain(&mut self, id: ObjectId) -> Option<ObjectId> {
        let mut current = id;
        for _ in 0..=self.options.max_reference_chain {
            self.ensure_loaded(current);
            match self.objects.get(&current) {
                Some(PdfObject::Reference(next)) => current = *next,
                Some(_) => return Some(current),
                // Re-entered while this object is still being loaded
                None => return None,
            }
        }
        debug!(
            "Reference chain from {} exceeds {} hops; using null",
            id, self.options.max_reference_chain
        );
        None
    }

    fn ensure_loaded(&mut self, id: ObjectId) {
        if self.objects.contains_key(&id) || !self.loading.insert(id) {
            return;
        }
        let object = self.load_object(id);
        self.loading.remove(&id);
        self.objects.insert(id, object);
    }

    fn load_object(&mut self, id: ObjectId) -> PdfObject {
        let Some(entry) = self.xref.get_entry(id.number()).copied() else {
            debug!("Object {} has no cross-reference entry; using null", id);
            return PdfObject::Null;
        };

        match entry {
            XRefEntry::Free { .. } => {
                debug!("Object {} is free; using null", id);
                PdfObject::Null
            }
            XRefEntry::InUse { offset, generation } => {
                if generation != id.generation() {
                    debug!(
                        "Object {} requested but generation {} is current; using null",
                        id, generation
                    );
                    return PdfObject::Null;
                }
                if let Some(object) = self.parse_at(offset, id) {
                    return object;
                }

                let found = match self.scan_index().get_entry(id.number()) {
                    Some(XRefEntry::InUse { offset: found, .. }) if *found != offset => *found,
                    _ => {
                        debug!("Object {} unreadable at {}; using null", id, offset);
                        return PdfObject::Null;
                    }
                };
                match self.parse_at(found, id) {
                    Some(object) => {
                        self.warn(format!(
                            "object {} is not at its recorded offset {}; found it at {}",
                            id, offset, found
                        ));
                        object
                    }
                    None => PdfObject::Null,
                }
            }
            XRefEntry::Compressed {
                stream_object,
                index,
            } => {
                if id.generation() != 0 {
                    return PdfObject::Null;
                }
                self.object_stream(stream_object)
                    .and_then(|stream| stream.get_indexed(id.number(), index as usize))
                    .cloned()
                    .unwrap_or(PdfObject::Null)
            }
        }
    }

    /// Parse the indirect object at `offset`, accepting it only if it
    /// carries the expected id
    fn parse_at(&self, offset: u64, id: ObjectId) -> Option<PdfObject> {
        let offset = usize::try_from(offset)
            .ok()
            .filter(|o| *o < self.data.len())?;
        let mut parser =
            ObjectParser::at(&self.data, offset, &self.options).with_length_resolver(self);
        match parser.parse_indirect_object() {
            Ok((found, object)) if found == id => Some(object),
            Ok((found, _)) => {
                debug!("Expected object {} at {}, found {}", id, offset, found);
                None
            }
            Err(e) => {
                debug!("Object {} at {} failed to parse: {}", id, offset, e);
                None
            }
        }
    }

    fn object_stream(&mut self, number: u32) -> Option<&ObjectStream> {
        if !self.object_streams.contains_key(&number) {
            // The placeholder stops a stream that lists itself from recursing
            self.object_streams.insert(number, None);
            let parsed = self.load_object_stream(number);
            self.object_streams.insert(number, parsed);
        }
        self.object_streams.get(&number).and_then(Option::as_ref)
    }

    fn load_object_stream(&mut self, number: u32) -> Option<ObjectStream> {
        let generation = match self.xref.get_entry(number) {
            Some(XRefEntry::InUse { generation, .. }) => *generation,
            _ => {
                debug!("Object stream {} is not an uncompressed object", number);
                return None;
            }
        };
        let id = ObjectId::new(number, generation);
        self.ensure_loaded(id);

        let parsed = match self.objects.get(&id) {
            Some(PdfObject::Stream(stream)) => ObjectStream::parse(stream, &self.options),
            _ => {
                debug!("Object stream {} is not a stream", number);
                return None;
            }
        };
        match parsed {
            Ok(stream) => Some(stream),
            Err(e) => {
                self.warn(format!("object stream {} is unreadable: {}", number, e));
                None
            }
        }
    }

    fn scan_index(&mut self) -> &XRefTable {
        let (data, options) = (&self.data, &self.options);
        self.scan_index.get_or_insert_with(|| {
            debug!("Scanning file for object headers");
            XRefRecovery::new(data, options).scan_table()
        })
    }

    /// A loaded object, or `null` if it has not been loaded or does not exist
    pub fn get(&self, id: ObjectId) -> &PdfObject {
        self.objects.get(&id).unwrap_or(&NULL_OBJECT)
    }

    /// A loaded object, if any
    pub fn object(&self, id: ObjectId) -> Option<&PdfObject> {
        self.objects.get(&id)
    }

    pub fn root_id(&self) -> ObjectId {
        self.root
    }

    /// The document catalog
    pub fn catalog(&mut self) -> Result<&PdfDictionary> {
        let root = self.root;
        match self.resolve(root) {
            PdfObject::Dictionary(dict) => Ok(dict),
            _ => Err(PdfError::MissingRoot),
        }
    }

    /// Leaf pages in document order. Revisited nodes are skipped, so a
    /// cyclic page tree still terminates.
    pub fn page_ids(&mut self) -> Vec<ObjectId> {
        let Some(tree_root) = self.pages_root() else {
            return Vec::new();
        };

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![tree_root];

        while let Some(id) = stack.pop() {
            let Some(target) = self.follow_chain(id) else {
                continue;
            };
            if !visited.insert(target) {
                debug!("Page tree visits {} twice; skipping", target);
                continue;
            }
            let Some(dict) = self.get(target).as_dict() else {
                debug!("Page tree node {} is not a dictionary", target);
                continue;
            };

            if is_pages_node(dict) {
                let kids = kid_references(dict);
                stack.extend(kids.into_iter().rev());
            } else {
                pages.push(target);
            }
        }

        pages
    }

    pub fn page_count(&mut self) -> usize {
        self.page_ids().len()
    }

    fn pages_root(&mut self) -> Option<ObjectId> {
        self.catalog()
            .ok()
            .and_then(|catalog| catalog.get("Pages"))
            .and_then(|pages| pages.as_reference())
    }

    /// Every object reachable from the trailer, in ascending id order.
    /// Dangling targets are left out.
    pub fn reachable_ids(&mut self) -> Vec<ObjectId> {
        let mut starts = Vec::new();
        for (key, value) in self.trailer.dict.iter() {
            if *key != "Encrypt" {
                value.collect_references(&mut starts);
            }
        }
        self.collect_reachable(starts)
    }

    /// Objects reachable from `starts`, in ascending id order
    pub fn collect_reachable(&mut self, starts: Vec<ObjectId>) -> Vec<ObjectId> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut stack = starts;

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            self.ensure_loaded(id);
            match self.objects.get(&id) {
                None | Some(PdfObject::Null) => {
                    debug!("Reference to {} is dangling", id);
                }
                Some(object) => {
                    object.collect_references(&mut stack);
                    found.push(id);
                }
            }
        }

        found.sort();
        found
    }

    /// Every in-use object of the file, except cross-reference streams,
    /// object streams and the old linearization dictionary and hint stream
    pub fn all_object_ids(&mut self) -> Vec<ObjectId> {
        let old_hint_offset =
            check::find_parameters(&self.data, &self.options).map(|params| params.hint_offset);
        let candidates: Vec<ObjectId> = self
            .xref
            .iter()
            .filter(|(num, entry)| **num != 0 && entry.is_in_use())
            .filter(|(num, entry)| match (entry, old_hint_offset) {
                (XRefEntry::InUse { offset, .. }, Some(hint)) if *offset == hint => {
                    debug!("Dropping old hint stream {}", num);
                    false
                }
                _ => true,
            })
            .map(|(num, entry)| ObjectId::new(*num, entry.generation()))
            .collect();

        let mut ids = Vec::new();
        for id in candidates {
            self.ensure_loaded(id);
            match self.objects.get(&id) {
                None | Some(PdfObject::Null) => {}
                Some(object) if is_structural(object) => {}
                Some(_) => ids.push(id),
            }
        }
        ids
    }

    /// Copy the inheritable attributes of intermediate page tree nodes down
    /// to the leaf pages and remove them from the intermediate nodes.
    pub fn push_inherited_attributes(&mut self) {
        let Some(tree_root) = self.pages_root() else {
            return;
        };

        let mut visited = HashSet::new();
        let mut stack: Vec<(ObjectId, Vec<(PdfName, PdfObject)>)> = vec![(tree_root, Vec::new())];
        let mut copied = 0usize;

        while let Some((id, mut inherited)) = stack.pop() {
            let Some(target) = self.follow_chain(id) else {
                continue;
            };
            if !visited.insert(target) {
                continue;
            }
            let Some(dict) = self.objects.get_mut(&target).and_then(|o| o.as_dict_mut()) else {
                continue;
            };

            if is_pages_node(dict) {
                for key in INHERITABLE_ATTRIBUTES {
                    if let Some(value) = dict.remove(key) {
                        inherited.retain(|(name, _)| name != key);
                        inherited.push((PdfName::from(*key), value));
                    }
                }
                for kid in kid_references(dict).into_iter().rev() {
                    stack.push((kid, inherited.clone()));
                }
            } else {
                for (name, value) in inherited {
                    if let std::collections::hash_map::Entry::Vacant(slot) = dict.0.entry(name) {
                        slot.insert(value);
                        copied += 1;
                    }
                }
            }
        }

        if copied > 0 {
            debug!("Pushed {} inherited attributes down to pages", copied);
        }
    }

    /// Fully inlined copy of an object. References that close a cycle, and
    /// anything nested deeper than the recursion limit, become `null`.
    pub fn resolve_deep(&mut self, id: ObjectId) -> PdfObject {
        let mut context = StackSafeContext::with_max_depth(self.options.max_recursion_depth);
        self.deep_reference(id, &mut context)
    }

    fn deep_reference(&mut self, id: ObjectId, context: &mut StackSafeContext) -> PdfObject {
        if context.visit_ref(id).is_err() {
            debug!("Cycle through {}; using null", id);
            return PdfObject::Null;
        }
        let object = self.resolve(id).clone();
        let result = self.deep_value(object, context);
        context.unvisit_ref(id);
        result
    }

    fn deep_value(&mut self, object: PdfObject, context: &mut StackSafeContext) -> PdfObject {
        if context.enter().is_err() {
            debug!("Nesting deeper than {}; using null", context.max_depth);
            return PdfObject::Null;
        }
        let result = match object {
            PdfObject::Reference(id) => self.deep_reference(id, context),
            PdfObject::Array(array) => PdfObject::Array(PdfArray(
                array
                    .0
                    .into_iter()
                    .map(|item| self.deep_value(item, context))
                    .collect(),
            )),
            PdfObject::Dictionary(dict) => PdfObject::Dictionary(self.deep_dict(dict, context)),
            PdfObject::Stream(mut stream) => {
                stream.dict = self.deep_dict(stream.dict, context);
                PdfObject::Stream(stream)
            }
            other => other,
        };
        context.exit();
        result
    }

    fn deep_dict(&mut self, dict: PdfDictionary, context: &mut StackSafeContext) -> PdfDictionary {
        PdfDictionary(
            dict.0
                .into_iter()
                .map(|(key, value)| (key, self.deep_value(value, context)))
                .collect(),
        )
    }

    /// Whether the file starts with a linearization parameter dictionary
    pub fn is_linearized(&self) -> bool {
        check::is_linearized(&self.data, &self.options)
    }

    pub fn version(&self) -> PdfVersion {
        self.version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn trailer(&self) -> &PdfTrailer {
        &self.trailer
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// True when the cross-reference table came from a full scan
    pub fn was_rebuilt(&self) -> bool {
        self.rebuilt
    }

    /// Warnings collected so far, oldest first; the list is emptied
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

impl LengthResolver for Document {
    fn resolve_length(&self, id: ObjectId) -> Option<i64> {
        if let Some(object) = self.objects.get(&id) {
            return object.as_integer();
        }
        match self.xref.get_entry(id.number())? {
            XRefEntry::InUse { offset, generation } if *generation == id.generation() => {
                let offset = usize::try_from(*offset).ok()?;
                let mut parser = ObjectParser::at(&self.data, offset, &self.options);
                match parser.parse_indirect_object().ok()? {
                    (found, object) if found == id => object.as_integer(),
                    _ => None,
                }
            }
            XRefEntry::Compressed {
                stream_object,
                index,
            } => self
                .object_streams
                .get(stream_object)?
                .as_ref()?
                .get_indexed(id.number(), *index as usize)?
                .as_integer(),
            _ => None,
        }
    }
}

/// Intermediate page tree node: typed `/Pages`, or untyped with `/Kids`
pub(crate) fn is_pages_node(dict: &PdfDictionary) -> bool {
    dict.has_name("Type", "Pages") || (!dict.has_name("Type", "Page") && dict.contains_key("Kids"))
}

fn kid_references(dict: &PdfDictionary) -> Vec<ObjectId> {
    dict.get("Kids")
        .and_then(|kids| kids.as_array())
        .map(|kids| kids.iter().filter_map(|kid| kid.as_reference()).collect())
        .unwrap_or_default()
}

/// File-structure objects that are regenerated rather than copied
fn is_structural(object: &PdfObject) -> bool {
    match object.as_dict() {
        Some(dict) => {
            dict.contains_key("Linearized")
                || dict.has_name("Type", "XRef")
                || dict.has_name("Type", "ObjStm")
        }
        None => false,
    }
}
