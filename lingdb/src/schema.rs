//! Fieldwork schema registry.
//!
//! In-memory description of the searchable data model: which models may
//! be searched, which attributes each model exposes, how attributes link
//! to other models, and which models can be joined to which.
//!
//! The registry is read-only once built, so callers wrap it in an
//! Arc<Registry> and share one copy across every compiler they create.
//! Search input is validated against these tables as a whitelist; a name
//! that is absent here is rejected, never passed through.

use crate::query::Relation;
use json::JsonValue;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Id,
    Int,
    Float,
    Text,
    Bool,
    Date,
    Datetime,
    Link,
}

impl DataType {
    /// True for attributes stored as character data, i.e. those that
    /// collation settings apply to.
    pub fn is_text(&self) -> bool {
        match *self {
            Self::Text => true,
            _ => false,
        }
    }
}

impl From<&DataType> for &str {
    fn from(dt: &DataType) -> &'static str {
        match *dt {
            DataType::Id => "id",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Text => "text",
            DataType::Bool => "bool",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Link => "link",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", <&str>::from(self))
    }
}

/// Cardinality of a linked attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelType {
    Scalar,
    Collection,
}

impl From<&RelType> for &str {
    fn from(rt: &RelType) -> &'static str {
        match *rt {
            RelType::Scalar => "scalar",
            RelType::Collection => "collection",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", <&str>::from(self))
    }
}

/// Physical description of a linked attribute.
///
/// `key` names a foreign key column: for a scalar link it lives on the
/// owning model's table, for a collection link it is the owning side's
/// column in the `map` table when `map` is set, otherwise the owning
/// model's key column on the far table.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    class: String,
    reltype: RelType,
    key: String,
    map: Option<String>,
}

impl Link {
    pub fn new(class: &str, reltype: RelType, key: &str) -> Link {
        Link {
            class: class.to_string(),
            reltype,
            key: key.to_string(),
            map: None,
        }
    }

    pub fn with_map(class: &str, reltype: RelType, key: &str, map: &str) -> Link {
        Link {
            class: class.to_string(),
            reltype,
            key: key.to_string(),
            map: Some(map.to_string()),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }
    pub fn reltype(&self) -> RelType {
        self.reltype
    }
    pub fn key(&self) -> &str {
        &self.key
    }
    pub fn map(&self) -> Option<&str> {
        self.map.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    datatype: DataType,
    link: Option<Link>,
    alias_of: Option<String>,
    relations: Option<Vec<Relation>>,
}

impl Attribute {
    pub fn new(name: &str, datatype: DataType) -> Attribute {
        Attribute {
            name: name.to_string(),
            datatype,
            link: None,
            alias_of: None,
            relations: None,
        }
    }

    pub fn linked(name: &str, link: Link) -> Attribute {
        Attribute {
            name: name.to_string(),
            datatype: DataType::Link,
            link: Some(link),
            alias_of: None,
            relations: None,
        }
    }

    /// Route this attribute name to another attribute's metadata.
    pub fn aliased(mut self, canonical: &str) -> Attribute {
        self.alias_of = Some(canonical.to_string());
        self
    }

    /// Replace the default relation whitelist for this attribute.
    pub fn restricted(mut self, relations: &[Relation]) -> Attribute {
        self.relations = Some(relations.to_vec());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn datatype(&self) -> DataType {
        self.datatype
    }
    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }
    pub fn alias_of(&self) -> Option<&str> {
        self.alias_of.as_deref()
    }

    /// May `relation` be applied to this attribute?
    ///
    /// An explicit whitelist wins when present.  Otherwise linked
    /// attributes accept equality tests only and plain attributes
    /// accept everything.
    pub fn relation_permitted(&self, relation: Relation) -> bool {
        if let Some(relations) = self.relations.as_ref() {
            relations.contains(&relation)
        } else if self.link.is_some() {
            relation == Relation::Eq || relation == Relation::Ne
        } else {
            true
        }
    }

    /// Client-facing description of this attribute, used by the
    /// search-parameters payload.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = json::object! {
            "type": <&str>::from(&self.datatype),
        };
        if let Some(link) = self.link.as_ref() {
            obj["foreign_model"] = link.class().into();
            obj["foreign_type"] = <&str>::from(&link.reltype()).into();
        }
        obj
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute: name={} datatype={}", self.name, self.datatype)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    tablename: String,

    /// Name of the primary key attribute.  Usually "id", but not always.
    pkey: String,

    attributes: HashMap<String, Attribute>,

    /// Models reachable by an implicit join, mapped to the attribute of
    /// this model the join travels through.
    joins: HashMap<String, String>,
}

impl Model {
    pub fn new(name: &str, tablename: &str, pkey: &str) -> Model {
        Model {
            name: name.to_string(),
            tablename: tablename.to_string(),
            pkey: pkey.to_string(),
            attributes: HashMap::new(),
            joins: HashMap::new(),
        }
    }

    pub fn add(&mut self, attribute: Attribute) {
        self.attributes
            .insert(attribute.name().to_string(), attribute);
    }

    pub fn add_join(&mut self, model: &str, path: &str) {
        self.joins.insert(model.to_string(), path.to_string());
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn tablename(&self) -> &str {
        &self.tablename
    }
    pub fn pkey(&self) -> &str {
        &self.pkey
    }
    pub fn attributes(&self) -> &HashMap<String, Attribute> {
        &self.attributes
    }

    /// Fetch an attribute by its searchable name, following at most one
    /// alias hop to the canonical attribute.
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        let attribute = self.attributes.get(name)?;
        match attribute.alias_of() {
            Some(canonical) => self.attributes.get(canonical),
            None => Some(attribute),
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attribute on this model that a join to `model` travels through,
    /// if such a join is possible.
    pub fn join_path(&self, model: &str) -> Option<&str> {
        self.joins.get(model).map(|p| p.as_str())
    }

    /// Vec of attribute names sorted alphabetically.
    pub fn attribute_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model: name={} tablename={} attributes={}",
            self.name,
            self.tablename,
            self.attributes.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    models: HashMap<String, Model>,

    /// Model names that resolve to another model's storage, e.g. a
    /// Memorizer is stored as a User.
    aliases: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            models: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn insert(&mut self, model: Model) {
        self.models.insert(model.name().to_string(), model);
    }

    pub fn add_alias(&mut self, name: &str, target: &str) {
        self.aliases.insert(name.to_string(), target.to_string());
    }

    pub fn get_model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Resolve a model-name alias to the entity that stores its data.
    /// Returns the input name when no alias applies.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        match self.aliases.get(name) {
            Some(target) => target.as_str(),
            None => name,
        }
    }

    /// Vec of model names sorted alphabetically.
    pub fn model_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }

    /// Build the full linguistic-fieldwork registry.
    ///
    /// Backup models carry flattened text copies of their source
    /// record's relational attributes, so those attribute names exist
    /// but do not link anywhere.
    pub fn fieldwork() -> Registry {
        let mut registry = Registry::new();

        let mut collection = Model::new("Collection", "collection", "id");
        collection.add(idcol("id"));
        collection.add(text("UUID"));
        collection.add(text("title"));
        collection.add(text("type"));
        collection.add(text("url"));
        collection.add(text("description"));
        collection.add(text("markupLanguage"));
        collection.add(text("contents"));
        collection.add(text("html"));
        collection.add(scalar("speaker", "Speaker", "speaker_id"));
        collection.add(scalar("source", "Source", "source_id"));
        collection.add(scalar("elicitor", "User", "elicitor_id"));
        collection.add(scalar("enterer", "User", "enterer_id"));
        collection.add(date("dateElicited"));
        collection.add(datetime("datetimeEntered"));
        collection.add(datetime("datetimeModified"));
        collection.add(collection_attr("tags", "Tag", "collection_id", "collectiontag"));
        collection.add(collection_attr("forms", "Form", "collection_id", "collectionform"));
        collection.add(collection_attr("files", "File", "collection_id", "collectionfile"));
        collection.add_join("Form", "forms");
        collection.add_join("File", "files");
        collection.add_join("Tag", "tags");
        registry.insert(collection);

        let mut collection_backup = Model::new("CollectionBackup", "collectionbackup", "id");
        collection_backup.add(idcol("id"));
        collection_backup.add(text("UUID"));
        collection_backup.add(int("collection_id"));
        collection_backup.add(text("title"));
        collection_backup.add(text("type"));
        collection_backup.add(text("url"));
        collection_backup.add(text("description"));
        collection_backup.add(text("markupLanguage"));
        collection_backup.add(text("contents"));
        collection_backup.add(text("html"));
        collection_backup.add(text("speaker"));
        collection_backup.add(text("source"));
        collection_backup.add(text("elicitor"));
        collection_backup.add(text("enterer"));
        collection_backup.add(date("dateElicited"));
        collection_backup.add(datetime("datetimeEntered"));
        collection_backup.add(datetime("datetimeModified"));
        collection_backup.add(text("tags"));
        collection_backup.add(text("forms"));
        collection_backup.add(text("files"));
        registry.insert(collection_backup);

        let mut elicitation_method = Model::new("ElicitationMethod", "elicitationmethod", "id");
        elicitation_method.add(idcol("id"));
        elicitation_method.add(text("name"));
        elicitation_method.add(text("description"));
        elicitation_method.add(datetime("datetimeModified"));
        registry.insert(elicitation_method);

        let mut form = Model::new("Form", "form", "id");
        form.add(idcol("id"));
        form.add(text("UUID"));
        form.add(text("transcription"));
        form.add(text("phoneticTranscription"));
        form.add(text("narrowPhoneticTranscription"));
        form.add(text("morphemeBreak"));
        form.add(text("morphemeGloss"));
        form.add(text("comments"));
        form.add(text("speakerComments"));
        form.add(text("grammaticality"));
        form.add(date("dateElicited"));
        form.add(datetime("datetimeEntered"));
        form.add(datetime("datetimeModified"));
        form.add(text("syntacticCategoryString"));
        form.add(text("morphemeBreakIDs"));
        form.add(text("morphemeGlossIDs"));
        form.add(text("breakGlossCategory"));
        form.add(text("syntax"));
        form.add(text("semantics"));
        form.add(scalar("elicitor", "User", "elicitor_id"));
        form.add(scalar("enterer", "User", "enterer_id"));
        form.add(scalar("verifier", "User", "verifier_id"));
        form.add(scalar("speaker", "Speaker", "speaker_id"));
        form.add(scalar("elicitationMethod", "ElicitationMethod", "elicitationmethod_id"));
        form.add(scalar("syntacticCategory", "SyntacticCategory", "syntacticcategory_id"));
        form.add(scalar("source", "Source", "source_id"));
        form.add(collection_on("glosses", "Gloss", "form_id"));
        form.add(collection_attr("tags", "Tag", "form_id", "formtag"));
        form.add(collection_attr("files", "File", "form_id", "formfile"));
        form.add(collection_attr("collections", "Collection", "form_id", "collectionform"));
        form.add(collection_attr("memorizers", "User", "form_id", "userform"));
        form.add_join("File", "files");
        form.add_join("Gloss", "glosses");
        form.add_join("Tag", "tags");
        form.add_join("Collection", "collections");
        form.add_join("Memorizer", "memorizers");
        registry.insert(form);

        let mut form_backup = Model::new("FormBackup", "formbackup", "id");
        form_backup.add(idcol("id"));
        form_backup.add(text("UUID"));
        form_backup.add(int("form_id"));
        form_backup.add(text("transcription"));
        form_backup.add(text("phoneticTranscription"));
        form_backup.add(text("narrowPhoneticTranscription"));
        form_backup.add(text("morphemeBreak"));
        form_backup.add(text("morphemeGloss"));
        form_backup.add(text("comments"));
        form_backup.add(text("speakerComments"));
        form_backup.add(text("grammaticality"));
        form_backup.add(date("dateElicited"));
        form_backup.add(datetime("datetimeEntered"));
        form_backup.add(datetime("datetimeModified"));
        form_backup.add(text("syntacticCategoryString"));
        form_backup.add(text("morphemeBreakIDs"));
        form_backup.add(text("morphemeGlossIDs"));
        form_backup.add(text("breakGlossCategory"));
        form_backup.add(text("syntax"));
        form_backup.add(text("semantics"));
        form_backup.add(text("elicitor"));
        form_backup.add(text("enterer"));
        form_backup.add(text("verifier"));
        form_backup.add(text("speaker"));
        form_backup.add(text("elicitationMethod"));
        form_backup.add(text("syntacticCategory"));
        form_backup.add(text("source"));
        form_backup.add(text("glosses"));
        form_backup.add(text("tags"));
        form_backup.add(text("files"));
        form_backup.add(text("collections"));
        registry.insert(form_backup);

        let mut form_search = Model::new("FormSearch", "formsearch", "id");
        form_search.add(idcol("id"));
        form_search.add(text("name"));
        form_search.add(text("search"));
        form_search.add(text("description"));
        form_search.add(scalar("enterer", "User", "enterer_id"));
        form_search.add(datetime("datetimeModified"));
        registry.insert(form_search);

        let mut file = Model::new("File", "file", "id");
        file.add(idcol("id"));
        file.add(text("filename"));
        file.add(text("name"));
        file.add(text("MIMEtype"));
        file.add(int("size"));
        file.add(scalar("enterer", "User", "enterer_id"));
        file.add(text("description"));
        file.add(date("dateElicited"));
        file.add(datetime("datetimeEntered"));
        file.add(datetime("datetimeModified"));
        file.add(scalar("elicitor", "User", "elicitor_id"));
        file.add(scalar("speaker", "Speaker", "speaker_id"));
        file.add(scalar("parentFile", "File", "parentFile_id"));
        file.add(text("utteranceType"));
        file.add(float("start"));
        file.add(float("end"));
        file.add(text("url"));
        file.add(text("password"));
        file.add(collection_attr("tags", "Tag", "file_id", "filetag"));
        file.add(collection_attr("forms", "Form", "file_id", "formfile"));
        file.add(collection_attr("collections", "Collection", "file_id", "collectionfile"));
        file.add_join("Tag", "tags");
        file.add_join("Form", "forms");
        file.add_join("Collection", "collections");
        registry.insert(file);

        let mut gloss = Model::new("Gloss", "gloss", "id");
        gloss.add(idcol("id"));
        gloss.add(text("gloss"));
        gloss.add(text("glossGrammaticality"));
        gloss.add(datetime("datetimeModified"));
        registry.insert(gloss);

        // The language table is the ISO 639-3 reference data, which
        // arrives with capitalized column names and a 3-letter code as
        // its primary key.
        let mut language = Model::new("Language", "language", "Id");
        language.add(text("Id"));
        language.add(text("Part2B"));
        language.add(text("Part2T"));
        language.add(text("Part1"));
        language.add(text("Scope"));
        language.add(text("Type"));
        language.add(text("Ref_Name"));
        language.add(text("Comment"));
        language.add(datetime("datetimeModified"));
        registry.insert(language);

        // A memorizer is a user searched through the remembered-forms
        // relationship, exposing a trimmed attribute set.
        let mut memorizer = Model::new("Memorizer", "user", "id");
        memorizer.add(idcol("id"));
        memorizer.add(text("firstName"));
        memorizer.add(text("lastName"));
        memorizer.add(text("role"));
        registry.insert(memorizer);

        let mut orthography = Model::new("Orthography", "orthography", "id");
        orthography.add(idcol("id"));
        orthography.add(text("name"));
        orthography.add(text("orthography"));
        orthography.add(boolean("lowercase"));
        orthography.add(boolean("initialGlottalStops"));
        orthography.add(datetime("datetimeModified"));
        registry.insert(orthography);

        let mut source = Model::new("Source", "source", "id");
        source.add(idcol("id"));
        source.add(int("file_id"));
        source.add(scalar("file", "File", "file_id"));
        source.add(datetime("datetimeModified"));
        source.add(text("type"));
        source.add(text("key"));
        source.add(text("address"));
        source.add(text("annote"));
        source.add(text("author"));
        source.add(text("booktitle"));
        source.add(text("chapter"));
        source.add(text("crossref"));
        source.add(text("edition"));
        source.add(text("editor"));
        source.add(text("howpublished"));
        source.add(text("institution"));
        source.add(text("journal"));
        source.add(text("keyField"));
        source.add(text("month"));
        source.add(text("note"));
        source.add(text("number"));
        source.add(text("organization"));
        source.add(text("pages"));
        source.add(text("publisher"));
        source.add(text("school"));
        source.add(text("series"));
        source.add(text("title"));
        source.add(text("typeField"));
        source.add(text("url"));
        source.add(text("volume"));
        source.add(int("year"));
        source.add(text("affiliation"));
        source.add(text("abstract"));
        source.add(text("contents"));
        source.add(text("copyright"));
        source.add(text("ISBN"));
        source.add(text("ISSN"));
        source.add(text("keywords"));
        source.add(text("language"));
        source.add(text("location"));
        source.add(text("LCCN"));
        source.add(text("mrnumber"));
        source.add(text("price"));
        source.add(text("size"));
        registry.insert(source);

        let mut speaker = Model::new("Speaker", "speaker", "id");
        speaker.add(idcol("id"));
        speaker.add(text("firstName"));
        speaker.add(text("lastName"));
        speaker.add(text("dialect"));
        speaker.add(text("pageContent"));
        speaker.add(datetime("datetimeModified"));
        registry.insert(speaker);

        let mut syntactic_category = Model::new("SyntacticCategory", "syntacticcategory", "id");
        syntactic_category.add(idcol("id"));
        syntactic_category.add(text("name"));
        syntactic_category.add(text("type"));
        syntactic_category.add(text("description"));
        syntactic_category.add(datetime("datetimeModified"));
        registry.insert(syntactic_category);

        let mut user = Model::new("User", "user", "id");
        user.add(idcol("id"));
        user.add(text("firstName"));
        user.add(text("lastName"));
        user.add(text("email"));
        user.add(text("affiliation"));
        user.add(text("role"));
        user.add(text("markupLanguage"));
        user.add(text("pageContent"));
        user.add(text("html"));
        user.add(scalar("inputOrthography", "Orthography", "inputOrthography_id"));
        user.add(scalar("outputOrthography", "Orthography", "outputOrthography_id"));
        user.add(datetime("datetimeModified"));
        user.add(collection_attr("rememberedForms", "Form", "user_id", "userform"));
        registry.insert(user);

        let mut tag = Model::new("Tag", "tag", "id");
        tag.add(idcol("id"));
        tag.add(text("name"));
        tag.add(text("description"));
        tag.add(datetime("datetimeModified"));
        registry.insert(tag);

        registry.add_alias("Memorizer", "User");

        registry
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

fn idcol(name: &str) -> Attribute {
    Attribute::new(name, DataType::Id)
}

fn int(name: &str) -> Attribute {
    Attribute::new(name, DataType::Int)
}

fn float(name: &str) -> Attribute {
    Attribute::new(name, DataType::Float)
}

fn text(name: &str) -> Attribute {
    Attribute::new(name, DataType::Text)
}

fn boolean(name: &str) -> Attribute {
    Attribute::new(name, DataType::Bool)
}

fn date(name: &str) -> Attribute {
    Attribute::new(name, DataType::Date)
}

fn datetime(name: &str) -> Attribute {
    Attribute::new(name, DataType::Datetime)
}

fn scalar(name: &str, class: &str, key: &str) -> Attribute {
    Attribute::linked(name, Link::new(class, RelType::Scalar, key))
}

fn collection_attr(name: &str, class: &str, key: &str, map: &str) -> Attribute {
    Attribute::linked(name, Link::with_map(class, RelType::Collection, key, map))
}

fn collection_on(name: &str, class: &str, key: &str) -> Attribute {
    Attribute::linked(name, Link::new(class, RelType::Collection, key))
}
