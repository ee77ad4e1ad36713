//! Join-graph traversal and view construction.
//!
//! A view is anchored at a root cube and walks the join edges depth-first.
//! Every newly reached path becomes a [`JoinPath`] listing the fields of the
//! cube it ends at. Field names are deduplicated twice, with separate seen
//! sets: once across the whole view and once inside each folder.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use itertools::Itertools;
use log::{debug, info};

use crate::{
    cell::{clean_optional, coerce_boolean, titleize_identifier},
    context::Defect,
    model::{Cube, FieldRef, Folder, JoinPath, View},
    store::SemanticRecord,
};

/// Prefix tried when the requested root is not itself a cube.
pub const ROOT_PREFIX: &str = "fact_";
/// Root used when no cube has outgoing joins.
pub const DEFAULT_ROOT: &str = "main";

/// Caller-supplied knobs for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSettings {
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub root: Option<String>,
    /// Cube name → folder name.
    pub folder_overrides: BTreeMap<String, String>,
    /// Cube name → field names left out of the view.
    pub hidden: BTreeMap<String, BTreeSet<String>>,
}

impl ViewSettings {
    /// Reads view settings from store rows: the first non-blank `view_*` value
    /// wins, `view_folder_name` applies to its row's cube and a
    /// `visible_in_view` that coerces to false hides that row's field.
    pub fn from_records(records: &[SemanticRecord]) -> Self {
        let mut settings = ViewSettings::default();
        for record in records {
            if settings.name.is_none() {
                settings.name = clean_optional(record.view_name.as_deref());
            }
            if settings.title.is_none() {
                settings.title = clean_optional(record.view_title.as_deref());
            }
            if settings.description.is_none() {
                settings.description = clean_optional(record.view_description.as_deref());
            }
            let Some(cube) = clean_optional(record.cube_name.as_deref()) else {
                continue;
            };
            if let Some(folder) = clean_optional(record.view_folder_name.as_deref()) {
                settings.folder_overrides.entry(cube.clone()).or_insert(folder);
            }
            let field = clean_optional(record.dimension_name.as_deref());
            if let (Some(field), Some(false)) =
                (field, coerce_boolean(record.visible_in_view.as_deref()))
            {
                settings.hidden.entry(cube).or_default().insert(field);
            }
        }
        settings
    }

    fn is_hidden(&self, cube: &str, field: &str) -> bool {
        self.hidden
            .get(cube)
            .is_some_and(|fields| fields.contains(field))
    }

    fn folder_for(&self, cube: &str) -> String {
        self.folder_overrides
            .get(cube)
            .cloned()
            .unwrap_or_else(|| titleize_identifier(cube))
    }
}

/// Primary → secondary edges between cubes of one model.
#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl JoinGraph {
    pub fn from_cubes(cubes: &[Cube]) -> Self {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for cube in cubes {
            let targets = edges.entry(cube.name.clone()).or_default();
            targets.extend(cube.join_targets().map(str::to_string));
        }
        Self { edges }
    }

    pub fn contains(&self, cube: &str) -> bool {
        self.edges.contains_key(cube)
    }

    pub fn out_degree(&self, cube: &str) -> usize {
        self.edges.get(cube).map_or(0, BTreeSet::len)
    }

    /// Targets of `cube` that are cubes of the model, in lexicographic order.
    pub fn neighbors<'a>(&'a self, cube: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .get(cube)
            .into_iter()
            .flatten()
            .filter(|target| self.edges.contains_key(*target))
            .map(String::as_str)
    }

    /// Chooses the root cube: the requested name, then the requested name
    /// with [`ROOT_PREFIX`], then the cube with most outgoing edges, then
    /// [`DEFAULT_ROOT`], then the first cube by name.
    pub fn resolve_root(&self, requested: Option<&str>) -> Option<String> {
        if let Some(requested) = requested {
            if self.contains(requested) {
                return Some(requested.to_string());
            }
            let prefixed = format!("{ROOT_PREFIX}{requested}");
            if self.contains(&prefixed) {
                return Some(prefixed);
            }
        }
        // BTreeMap order plus strict comparison keeps the first name on ties.
        let busiest = self
            .edges
            .keys()
            .map(|name| (name, self.out_degree(name)))
            .filter(|(_, degree)| *degree > 0)
            .fold(None::<(&String, usize)>, |best, candidate| match best {
                Some((_, top)) if candidate.1 <= top => best,
                _ => Some(candidate),
            });
        if let Some((name, _)) = busiest {
            return Some(name.clone());
        }
        if self.contains(DEFAULT_ROOT) {
            return Some(DEFAULT_ROOT.to_string());
        }
        self.edges.keys().next().cloned()
    }

    /// Depth-first walk from `root`. Returns every newly reached path, root
    /// first, each emitted before its descendants.
    pub fn traverse(&self, root: &str) -> Vec<Vec<String>> {
        let mut visited = HashSet::new();
        let mut paths = Vec::new();
        let mut current = vec![root.to_string()];
        self.visit(&mut current, &mut visited, &mut paths);
        paths
    }

    fn visit(
        &self,
        current: &mut Vec<String>,
        visited: &mut HashSet<Vec<String>>,
        paths: &mut Vec<Vec<String>>,
    ) {
        if !visited.insert(current.clone()) {
            return;
        }
        paths.push(current.clone());
        let Some(node) = current.last().cloned() else {
            return;
        };
        for next in self.neighbors(&node) {
            if current.iter().any(|seen| seen == next) {
                continue;
            }
            current.push(next.to_string());
            self.visit(current, visited, paths);
            current.pop();
        }
    }
}

/// Builds the view for `cubes`. Fails only when there is no cube to anchor it.
pub fn build_view(cubes: &[Cube], settings: &ViewSettings) -> Result<View, Defect> {
    let graph = JoinGraph::from_cubes(cubes);
    let Some(root) = graph.resolve_root(settings.root.as_deref()) else {
        return Err(Defect::RootNotFound {
            view: settings.name.clone().unwrap_or_default(),
        });
    };
    debug!("View root resolved to '{root}'");

    let by_name: HashMap<&str, &Cube> = cubes
        .iter()
        .rev()
        .map(|cube| (cube.name.as_str(), cube))
        .collect();
    let visible_fields = |cube: &str| -> Vec<String> {
        by_name
            .get(cube)
            .map(|cube| {
                cube.field_names()
                    .filter(|field| !settings.is_hidden(&cube.name, field))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut global_owner: HashMap<String, String> = HashMap::new();
    let mut join_paths = Vec::new();
    for path in graph.traverse(&root) {
        let target = path.last().cloned().unwrap_or_default();
        let includes = visible_fields(&target)
            .into_iter()
            .map(|field| dedup(&mut global_owner, field, &target))
            .collect();
        join_paths.push(JoinPath {
            cubes: path,
            includes,
        });
    }

    let folders = build_folders(&join_paths, settings, &visible_fields);

    let name = settings
        .name
        .clone()
        .unwrap_or_else(|| format!("{root}_view"));
    let title = settings
        .title
        .clone()
        .unwrap_or_else(|| titleize_identifier(&name));
    let description = settings
        .description
        .clone()
        .unwrap_or_else(|| format!("View over {} joined from {root}", titleize_identifier(&root)));
    info!(
        "Built view '{}' with {} join path(s) and {} folder(s)",
        name,
        join_paths.len(),
        folders.len()
    );
    Ok(View {
        name,
        title,
        description,
        cubes: join_paths,
        folders,
    })
}

/// Folder pass with its own seen set per folder. Folders keep the order in
/// which they are first reached.
fn build_folders(
    join_paths: &[JoinPath],
    settings: &ViewSettings,
    visible_fields: &dyn Fn(&str) -> Vec<String>,
) -> Vec<Folder> {
    let mut folders: Vec<(Folder, HashMap<String, String>)> = Vec::new();
    let targets = join_paths.iter().map(JoinPath::target).unique();
    for target in targets {
        let folder_name = settings.folder_for(target);
        let idx = match folders.iter().position(|(folder, _)| folder.name == folder_name) {
            Some(idx) => idx,
            None => {
                folders.push((
                    Folder {
                        name: folder_name,
                        includes: Vec::new(),
                    },
                    HashMap::new(),
                ));
                folders.len() - 1
            }
        };
        let (folder, owners) = &mut folders[idx];
        for field in visible_fields(target) {
            folder.includes.push(dedup(owners, field, target));
        }
    }
    folders.into_iter().map(|(folder, _)| folder).collect()
}

fn dedup(owners: &mut HashMap<String, String>, field: String, cube: &str) -> FieldRef {
    match owners.get(&field) {
        Some(first_owner) => FieldRef::Suppressed {
            name: field,
            first_owner: first_owner.clone(),
        },
        None => {
            owners.insert(field.clone(), cube.to_string());
            FieldRef::Live(field)
        }
    }
}
