//! XML form of a project file.
//! 專案檔的 XML 表示。
//!
//! ```xml
//! <Project Name="app" Guid="...">
//!   <Property Name="AssemblyName" Value="app"/>
//!   <Configuration Name="Debug" Platform="AnyCPU">
//!     <Property Name="OutputPath" Value="bin/Debug"/>
//!   </Configuration>
//!   <Folder RelPath="src"/>
//!   <File RelPath="src/main.cs" BuildAction="Compile"/>
//!   <Reference Name="System.Xml" AssemblyName="System.Xml" Private="false"/>
//!   <ProjectReference Name="core" Project="{...}"/>
//! </Project>
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::attr;

/// Kind of item element.
/// 項目元素的種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Folder,
    File,
    Reference,
    ProjectReference,
}

/// An item element with its named string attributes.
/// 帶有具名字串屬性的項目元素。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemElement {
    pub item_type: ItemType,
    pub attributes: BTreeMap<String, String>,
}

impl ItemElement {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// `<Property Name=".." Value=".."/>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Value", default)]
    pub value: String,
}

impl PropertyEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Properties scoped to one configuration/platform pair.
/// 限定於單一組態與平台的屬性群組。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationGroup {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Platform", default = "default_platform")]
    pub platform: String,
    #[serde(rename = "Property", default)]
    pub properties: Vec<PropertyEntry>,
}

/// Platform assumed when a configuration omits one.
pub const DEFAULT_PLATFORM: &str = "AnyCPU";

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

impl ConfigurationGroup {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            properties: Vec::new(),
        }
    }

    pub fn matches(&self, name: &str, platform: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) && self.platform.eq_ignore_ascii_case(platform)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        lookup(&self.properties, name)
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        upsert(&mut self.properties, name, value.into());
    }
}

pub(crate) fn lookup<'a>(entries: &'a [PropertyEntry], name: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
        .map(|entry| entry.value.as_str())
}

pub(crate) fn upsert(entries: &mut Vec<PropertyEntry>, name: &str, value: String) {
    match entries
        .iter_mut()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
    {
        Some(entry) => entry.value = value,
        None => entries.push(PropertyEntry::new(name, value)),
    }
}

/// In-memory project document.
/// 記憶體中的專案文件。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDocument {
    pub name: Option<String>,
    pub guid: Option<String>,
    pub properties: Vec<PropertyEntry>,
    pub configurations: Vec<ConfigurationGroup>,
    pub items: Vec<ItemElement>,
}

impl ProjectDocument {
    /// Parses the XML text of a project file.
    /// 解析專案檔的 XML 內容。
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        let raw: ProjectXml = quick_xml::de::from_str(xml)?;
        Ok(raw.into())
    }

    /// Renders the document as indented XML.
    /// 以縮排後的 XML 輸出文件。
    pub fn to_xml(&self) -> Result<String, quick_xml::DeError> {
        let raw = ProjectXml::from(self);
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut body);
        serializer.indent(' ', 2);
        raw.serialize(serializer)?;
        body.push('\n');
        Ok(body)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        lookup(&self.properties, name)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "Project")]
struct ProjectXml {
    #[serde(rename = "@Name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "@Guid", default, skip_serializing_if = "Option::is_none")]
    guid: Option<String>,
    #[serde(rename = "Property", default)]
    properties: Vec<PropertyEntry>,
    #[serde(rename = "Configuration", default)]
    configurations: Vec<ConfigurationGroup>,
    #[serde(rename = "Folder", default)]
    folders: Vec<ItemXml>,
    #[serde(rename = "File", default)]
    files: Vec<ItemXml>,
    #[serde(rename = "Reference", default)]
    references: Vec<ItemXml>,
    #[serde(rename = "ProjectReference", default)]
    project_references: Vec<ItemXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ItemXml {
    #[serde(rename = "@RelPath", default, skip_serializing_if = "Option::is_none")]
    rel_path: Option<String>,
    #[serde(rename = "@Name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "@AssemblyName", default, skip_serializing_if = "Option::is_none")]
    assembly_name: Option<String>,
    #[serde(rename = "@HintPath", default, skip_serializing_if = "Option::is_none")]
    hint_path: Option<String>,
    #[serde(rename = "@BuildAction", default, skip_serializing_if = "Option::is_none")]
    build_action: Option<String>,
    #[serde(rename = "@SubType", default, skip_serializing_if = "Option::is_none")]
    sub_type: Option<String>,
    #[serde(rename = "@Private", default, skip_serializing_if = "Option::is_none")]
    private: Option<String>,
    #[serde(rename = "@Project", default, skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(
        rename = "@LinkedIntoProjectAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    linked_into_project_at: Option<String>,
}

impl ItemXml {
    fn fields_mut(&mut self) -> [(&'static str, &mut Option<String>); 9] {
        [
            (attr::REL_PATH, &mut self.rel_path),
            (attr::NAME, &mut self.name),
            (attr::ASSEMBLY_NAME, &mut self.assembly_name),
            (attr::HINT_PATH, &mut self.hint_path),
            (attr::BUILD_ACTION, &mut self.build_action),
            (attr::SUB_TYPE, &mut self.sub_type),
            (attr::PRIVATE, &mut self.private),
            (attr::PROJECT, &mut self.project),
            (attr::LINKED_INTO_PROJECT_AT, &mut self.linked_into_project_at),
        ]
    }

    fn into_element(mut self, item_type: ItemType) -> ItemElement {
        let mut element = ItemElement::new(item_type);
        for (name, slot) in self.fields_mut() {
            if let Some(value) = slot.take() {
                element.attributes.insert(name.to_string(), value);
            }
        }
        element
    }

    fn from_element(element: &ItemElement) -> Self {
        let mut raw = ItemXml::default();
        for (name, slot) in raw.fields_mut() {
            *slot = element.get(name).map(str::to_string);
        }
        raw
    }
}

impl From<ProjectXml> for ProjectDocument {
    fn from(raw: ProjectXml) -> Self {
        let groups = [
            (ItemType::Folder, raw.folders),
            (ItemType::File, raw.files),
            (ItemType::Reference, raw.references),
            (ItemType::ProjectReference, raw.project_references),
        ];
        let items = groups
            .into_iter()
            .flat_map(|(item_type, list)| {
                list.into_iter()
                    .map(move |item| item.into_element(item_type))
            })
            .collect();
        Self {
            name: raw.name,
            guid: raw.guid,
            properties: raw.properties,
            configurations: raw.configurations,
            items,
        }
    }
}

impl From<&ProjectDocument> for ProjectXml {
    fn from(doc: &ProjectDocument) -> Self {
        let mut raw = ProjectXml {
            name: doc.name.clone(),
            guid: doc.guid.clone(),
            properties: doc.properties.clone(),
            configurations: doc.configurations.clone(),
            ..ProjectXml::default()
        };
        for item in &doc.items {
            let list = match item.item_type {
                ItemType::Folder => &mut raw.folders,
                ItemType::File => &mut raw.files,
                ItemType::Reference => &mut raw.references,
                ItemType::ProjectReference => &mut raw.project_references,
            };
            list.push(ItemXml::from_element(item));
        }
        raw
    }
}
