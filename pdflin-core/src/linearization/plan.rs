//! Partitioning of a document into linearization parts
//!
//! Objects are grouped the way a viewer wants to receive them: the catalog,
//! everything the first page needs, each later page with the objects only it
//! uses, objects shared by several later pages, and the rest. New object
//! numbers follow the write order, with the linearization dictionary, the
//! catalog, the hint stream and the first page occupying `1..=k`.

use crate::document::{is_pages_node, Document};
use crate::error::{PdfError, Result};
use crate::parser::objects::{ObjectId, PdfObject};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Object number of the linearization parameter dictionary
pub const LINEARIZATION_DICT_NUMBER: u32 = 1;

/// One page and the objects written with it
#[derive(Debug, Clone, PartialEq)]
pub struct PagePart {
    /// The page object (original id)
    pub page: ObjectId,
    /// Objects in write order; the page object comes first
    pub objects: Vec<ObjectId>,
    /// Indices into [`LinearizationPlan::shared_table`] of shared objects
    /// the page uses
    pub shared_refs: Vec<u32>,
    /// First content stream of the page, if it is written with the page
    pub content: Option<ObjectId>,
}

/// Layout and renumbering for a linearized file
#[derive(Debug, Clone)]
pub struct LinearizationPlan {
    pub catalog: ObjectId,
    pub first_page: PagePart,
    pub later_pages: Vec<PagePart>,
    /// Objects used by two or more later pages
    pub shared: Vec<ObjectId>,
    /// Everything else reachable from the trailer
    pub other: Vec<ObjectId>,
    /// Shared object hint table rows: first-page objects used by later
    /// pages, then the shared part
    pub shared_table: Vec<ObjectId>,
    /// Number of leading `shared_table` rows that live in the first page
    pub first_page_shared: usize,
    renumber: HashMap<ObjectId, u32>,
}

impl LinearizationPlan {
    /// New number of an original object, if it is written
    pub fn new_id(&self, old: ObjectId) -> Option<ObjectId> {
        self.renumber.get(&old).map(|num| ObjectId::new(*num, 0))
    }

    /// New object number of the catalog
    pub fn catalog_number(&self) -> u32 {
        LINEARIZATION_DICT_NUMBER + 1
    }

    /// New object number of the primary hint stream
    pub fn hint_stream_number(&self) -> u32 {
        LINEARIZATION_DICT_NUMBER + 2
    }

    /// Highest object number covered by the first-page cross-reference
    /// section (`k`)
    pub fn first_page_last_number(&self) -> u32 {
        self.hint_stream_number() + self.first_page.objects.len() as u32
    }

    /// Highest object number in the file (`n`)
    pub fn last_number(&self) -> u32 {
        self.first_page_last_number()
            + self
                .later_pages
                .iter()
                .map(|part| part.objects.len() as u32)
                .sum::<u32>()
            + self.shared.len() as u32
            + self.other.len() as u32
    }

    pub fn page_count(&self) -> usize {
        1 + self.later_pages.len()
    }

    /// Every page part, first page included, in page order
    pub fn pages(&self) -> impl Iterator<Item = &PagePart> {
        std::iter::once(&self.first_page).chain(self.later_pages.iter())
    }

    /// Original ids of the objects written after the first page, in order
    pub fn later_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.later_pages
            .iter()
            .flat_map(|part| part.objects.iter().copied())
            .chain(self.shared.iter().copied())
            .chain(self.other.iter().copied())
    }

    fn assign_numbers(&mut self) {
        let mut next = self.hint_stream_number() + 1;
        let mut renumber = HashMap::new();
        renumber.insert(self.catalog, self.catalog_number());

        let order: Vec<ObjectId> = self
            .first_page
            .objects
            .iter()
            .copied()
            .chain(self.later_objects())
            .collect();
        for id in order {
            renumber.insert(id, next);
            next += 1;
        }
        self.renumber = renumber;
    }
}

/// Partition `document` for linearized output. Inheritable page attributes
/// are pushed down to the pages first. With `include_unreferenced`, objects
/// not reachable from the trailer are kept in the other part.
pub fn plan(document: &mut Document, include_unreferenced: bool) -> Result<LinearizationPlan> {
    document.push_inherited_attributes();

    let catalog = document.root_id();
    let pages = document.page_ids();
    if pages.is_empty() {
        return Err(PdfError::Linearization(
            "document has no pages".to_string(),
        ));
    }

    let mut objects = document.reachable_ids();
    if include_unreferenced {
        objects.extend(document.all_object_ids());
        objects.sort();
        objects.dedup();
    }
    let known: HashSet<ObjectId> = objects.iter().copied().collect();
    let page_set: HashSet<ObjectId> = pages.iter().copied().collect();

    let closures: Vec<BTreeSet<ObjectId>> = pages
        .iter()
        .map(|page| page_closure(document, *page, catalog, &known, &page_set))
        .collect();

    // First page: the page and its whole closure
    let first_page_id = pages[0];
    let mut first_objects = vec![first_page_id];
    first_objects.extend(closures[0].iter().copied());
    let first_set: HashSet<ObjectId> = first_objects.iter().copied().collect();

    // How many later pages use each object outside the first page
    let mut usage: HashMap<ObjectId, usize> = HashMap::new();
    let mut used_by_later: HashSet<ObjectId> = HashSet::new();
    for closure in &closures[1..] {
        for id in closure {
            used_by_later.insert(*id);
            if !first_set.contains(id) {
                *usage.entry(*id).or_default() += 1;
            }
        }
    }

    let shared: Vec<ObjectId> = {
        let mut shared: Vec<ObjectId> = usage
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| *id)
            .collect();
        shared.sort();
        shared
    };

    let first_page_shared: Vec<ObjectId> = first_objects[1..]
        .iter()
        .copied()
        .filter(|id| used_by_later.contains(id))
        .collect();
    let shared_table: Vec<ObjectId> = first_page_shared
        .iter()
        .chain(shared.iter())
        .copied()
        .collect();
    let shared_index: HashMap<ObjectId, u32> = shared_table
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, index as u32))
        .collect();

    let mut placed: HashSet<ObjectId> = first_set.clone();
    placed.insert(catalog);
    placed.extend(shared.iter().copied());

    let mut later_pages = Vec::with_capacity(pages.len() - 1);
    for (page, closure) in pages[1..].iter().zip(&closures[1..]) {
        let mut part_objects = vec![*page];
        let mut shared_refs = Vec::new();
        for id in closure {
            if let Some(index) = shared_index.get(id) {
                shared_refs.push(*index);
            } else if usage.get(id) == Some(&1) && !placed.contains(id) {
                part_objects.push(*id);
            }
        }
        placed.extend(part_objects.iter().copied());
        later_pages.push(PagePart {
            page: *page,
            content: first_content(document, *page, &part_objects),
            objects: part_objects,
            shared_refs,
        });
    }

    let other: Vec<ObjectId> = objects
        .iter()
        .copied()
        .filter(|id| !placed.contains(id))
        .collect();

    let first_page = PagePart {
        page: first_page_id,
        content: first_content(document, first_page_id, &first_objects),
        objects: first_objects,
        shared_refs: Vec::new(),
    };

    let mut plan = LinearizationPlan {
        catalog,
        first_page,
        later_pages,
        shared,
        other,
        shared_table,
        first_page_shared: first_page_shared.len(),
        renumber: HashMap::new(),
    };
    plan.assign_numbers();

    info!(
        "Linearization plan: {} pages, {} first-page objects, {} shared, {} other, {} objects total",
        plan.page_count(),
        plan.first_page.objects.len(),
        plan.shared.len(),
        plan.other.len(),
        plan.last_number()
    );
    Ok(plan)
}

/// Objects a page needs, without the page itself. `/Parent` of the page is
/// not followed, and the walk stops at page tree nodes and the catalog.
fn page_closure(
    document: &mut Document,
    page: ObjectId,
    catalog: ObjectId,
    known: &HashSet<ObjectId>,
    pages: &HashSet<ObjectId>,
) -> BTreeSet<ObjectId> {
    let mut stack = Vec::new();
    if let Some(dict) = document.get(page).as_dict() {
        for (key, value) in dict.iter() {
            if *key != "Parent" {
                value.collect_references(&mut stack);
            }
        }
    }

    let mut closure = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if id == catalog || id == page || pages.contains(&id) || !known.contains(&id) {
            continue;
        }
        if closure.contains(&id) {
            continue;
        }
        let object = document.resolve(id);
        if let Some(dict) = object.as_dict() {
            if is_pages_node(dict) || dict.has_name("Type", "Page") {
                debug!("Page closure of {} stops at page tree node {}", page, id);
                continue;
            }
        }
        object.collect_references(&mut stack);
        closure.insert(id);
    }
    closure
}

/// The page's first content stream, if it is among `part`
fn first_content(document: &Document, page: ObjectId, part: &[ObjectId]) -> Option<ObjectId> {
    let contents = document.get(page).as_dict()?.get("Contents")?;
    let id = match contents {
        PdfObject::Reference(id) => *id,
        PdfObject::Array(array) => array.iter().find_map(|item| item.as_reference())?,
        _ => return None,
    };
    part.contains(&id).then_some(id)
}
