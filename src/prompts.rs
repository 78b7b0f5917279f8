use crate::eid::Eid;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::Display,
    hash::Hash,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, RwLock},
    time::Instant,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Coding,
    Writing,
    Analysis,
    Creative,
    Learning,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "coding",
            Category::Writing => "writing",
            Category::Analysis => "analysis",
            Category::Creative => "creative",
            Category::Learning => "learning",
            Category::Other => "other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coding" => Ok(Category::Coding),
            "writing" => Ok(Category::Writing),
            "analysis" => Ok(Category::Analysis),
            "creative" => Ok(Category::Creative),
            "learning" => Ok(Category::Learning),
            "other" => Ok(Category::Other),
            other => Err(anyhow!(
                "unknown category {other:?}, expected one of: coding, writing, analysis, creative, learning, other"
            )),
        }
    }
}

#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Eid,

    pub title: String,
    pub description: String,
    pub content: String,
    pub category: Category,
    pub tags: Vec<String>,

    /// User ids that liked this prompt
    pub likes: Vec<String>,

    /// Missing means visible
    pub is_public: Option<bool>,

    pub created_at: DateTime<Utc>,
}

impl Prompt {
    /// A prompt is eligible for listing and matching unless explicitly hidden.
    pub fn is_eligible(&self) -> bool {
        self.is_public != Some(false)
    }
}

impl Hash for Prompt {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Prompt {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchQuery {
    pub category: Option<Category>,
    pub tag: Option<String>,
    pub keyword: Option<String>,

    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Eid,
    pub prompt_id: Eid,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommentCreate {
    pub author: String,
    pub body: String,
}

pub trait PromptStore: Send + Sync {
    fn search(&self, query: SearchQuery) -> anyhow::Result<Vec<Prompt>>;
    fn get(&self, id: &str) -> anyhow::Result<Option<Prompt>>;

    /// All prompts passing the visibility check, in stored order.
    fn find_eligible(&self) -> anyhow::Result<Vec<Prompt>>;
    fn find_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Prompt>>;
    fn count_comments(&self, prompt_id: &str) -> anyhow::Result<usize>;

    fn create(&self, create: PromptCreate) -> anyhow::Result<Prompt>;
    fn update(&self, id: &str, update: PromptUpdate) -> anyhow::Result<Prompt>;
    fn delete(&self, id: &str) -> anyhow::Result<()>;
    fn like(&self, id: &str, user: &str) -> anyhow::Result<Prompt>;
    fn add_comment(&self, prompt_id: &str, create: CommentCreate) -> anyhow::Result<Comment>;

    fn total(&self) -> anyhow::Result<usize>;
    fn tags(&self) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    prompts: Arc<RwLock<Vec<Prompt>>>,
    comments: Arc<RwLock<Vec<Comment>>>,
    prompts_path: PathBuf,
    comments_path: PathBuf,
}

const PROMPT_HEADERS: [&str; 9] = [
    "id",
    "title",
    "description",
    "content",
    "category",
    "tags",
    "likes",
    "is_public",
    "created_at",
];

const COMMENT_HEADERS: [&str; 5] = ["id", "prompt_id", "author", "body", "created_at"];

fn ensure_csv(path: &Path, headers: &[&str]) -> anyhow::Result<()> {
    if let Err(err) = std::fs::metadata(path) {
        match err.kind() {
            ErrorKind::NotFound => {
                log::info!("Creating new database at {}", path.display());
                let mut csv_wrt = csv::Writer::from_path(path)?;
                csv_wrt.write_record(headers)?;
                csv_wrt.flush()?;
            }
            _ => Err(err)?,
        }
    }
    Ok(())
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, name: &str) -> anyhow::Result<&'a str> {
    record.get(idx).ok_or_else(|| anyhow!("couldnt get record {name}"))
}

fn parse_timestamp(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl BackendCsv {
    pub fn load(base_dir: &Path) -> anyhow::Result<Self> {
        let prompts_path = base_dir.join("prompts.csv");
        let comments_path = base_dir.join("comments.csv");

        ensure_csv(&prompts_path, &PROMPT_HEADERS)?;
        ensure_csv(&comments_path, &COMMENT_HEADERS)?;

        let now = Instant::now();

        let mut prompts = vec![];
        let mut csv_reader = csv::Reader::from_path(&prompts_path)?;
        for record in csv_reader.records() {
            let record = record?;

            let is_public = match field(&record, 7, "is_public")? {
                "" => None,
                "true" => Some(true),
                "false" => Some(false),
                other => Err(anyhow!("bad is_public value {other:?}"))?,
            };

            prompts.push(Prompt {
                id: Eid::from(field(&record, 0, "id")?),
                title: field(&record, 1, "title")?.to_string(),
                description: field(&record, 2, "description")?.to_string(),
                content: field(&record, 3, "content")?.to_string(),
                category: field(&record, 4, "category")?.parse()?,
                tags: parse_list(field(&record, 5, "tags")?),
                likes: parse_list(field(&record, 6, "likes")?),
                is_public,
                created_at: parse_timestamp(field(&record, 8, "created_at")?)?,
            });
        }

        let mut comments = vec![];
        let mut csv_reader = csv::Reader::from_path(&comments_path)?;
        for record in csv_reader.records() {
            let record = record?;
            comments.push(Comment {
                id: Eid::from(field(&record, 0, "id")?),
                prompt_id: Eid::from(field(&record, 1, "prompt_id")?),
                author: field(&record, 2, "author")?.to_string(),
                body: field(&record, 3, "body")?.to_string(),
                created_at: parse_timestamp(field(&record, 4, "created_at")?)?,
            });
        }

        log::debug!(
            "took {}ms to read csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        Ok(BackendCsv {
            prompts: Arc::new(RwLock::new(prompts)),
            comments: Arc::new(RwLock::new(comments)),
            prompts_path,
            comments_path,
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_prompts()?;
        self.save_comments()
    }

    fn save_prompts(&self) -> anyhow::Result<()> {
        let prompts = self.prompts.read().unwrap();

        let temp_path = self.prompts_path.with_extension("csv-tmp");
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(PROMPT_HEADERS)?;
        for prompt in prompts.iter() {
            let tags = prompt.tags.join(",");
            let likes = prompt.likes.join(",");
            let created_at = prompt.created_at.to_rfc3339();
            csv_wrt.write_record([
                prompt.id.as_str(),
                prompt.title.as_str(),
                prompt.description.as_str(),
                prompt.content.as_str(),
                prompt.category.as_str(),
                tags.as_str(),
                likes.as_str(),
                match prompt.is_public {
                    None => "",
                    Some(true) => "true",
                    Some(false) => "false",
                },
                created_at.as_str(),
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.prompts_path)?;
        Ok(())
    }

    fn save_comments(&self) -> anyhow::Result<()> {
        let comments = self.comments.read().unwrap();

        let temp_path = self.comments_path.with_extension("csv-tmp");
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(COMMENT_HEADERS)?;
        for comment in comments.iter() {
            let created_at = comment.created_at.to_rfc3339();
            csv_wrt.write_record([
                comment.id.as_str(),
                comment.prompt_id.as_str(),
                comment.author.as_str(),
                comment.body.as_str(),
                created_at.as_str(),
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.comments_path)?;
        Ok(())
    }
}

impl PromptStore for BackendCsv {
    fn search(&self, query: SearchQuery) -> anyhow::Result<Vec<Prompt>> {
        let prompts = self.prompts.read().unwrap();

        let mut output = vec![];

        let query_tag = query.tag.map(|t| t.to_lowercase());
        let keywords = query
            .keyword
            .map(|k| {
                k.to_lowercase()
                    .split_whitespace()
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for prompt in prompts.iter() {
            if !prompt.is_eligible() {
                continue;
            }

            if let Some(category) = query.category {
                if prompt.category != category {
                    continue;
                }
            }

            if let Some(tag) = &query_tag {
                if !prompt.tags.iter().any(|t| t.to_lowercase() == *tag) {
                    continue;
                }
            }

            // every keyword must appear in at least one field
            let mut keywords_match = true;
            for keyword in &keywords {
                if prompt.title.to_lowercase().contains(keyword) {
                    continue;
                }
                if prompt.description.to_lowercase().contains(keyword) {
                    continue;
                }
                if prompt.content.to_lowercase().contains(keyword) {
                    continue;
                }
                if prompt.tags.iter().any(|t| t.to_lowercase().contains(keyword)) {
                    continue;
                }

                keywords_match = false;
                break;
            }

            if !keywords_match {
                continue;
            }

            output.push(prompt.clone());

            if query.limit.is_some_and(|limit| output.len() >= limit) {
                break;
            }
        }

        Ok(output)
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<Prompt>> {
        let prompts = self.prompts.read().unwrap();
        Ok(prompts.iter().find(|p| p.id.as_str() == id).cloned())
    }

    fn find_eligible(&self) -> anyhow::Result<Vec<Prompt>> {
        let prompts = self.prompts.read().unwrap();
        Ok(prompts.iter().filter(|p| p.is_eligible()).cloned().collect())
    }

    fn find_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Prompt>> {
        let prompts = self.prompts.read().unwrap();
        Ok(prompts
            .iter()
            .filter(|p| ids.iter().any(|id| p.id.as_str() == id))
            .cloned()
            .collect())
    }

    fn count_comments(&self, prompt_id: &str) -> anyhow::Result<usize> {
        let comments = self.comments.read().unwrap();
        Ok(comments
            .iter()
            .filter(|c| c.prompt_id.as_str() == prompt_id)
            .count())
    }

    fn create(&self, create: PromptCreate) -> anyhow::Result<Prompt> {
        let mut tags = create.tags.unwrap_or_default();
        let mut seen = HashSet::new();
        tags.retain(|item| seen.insert(item.clone()));

        let prompt = Prompt {
            id: Eid::new(),
            title: create.title,
            description: create.description.unwrap_or_default(),
            content: create.content,
            category: create.category,
            tags,
            likes: vec![],
            is_public: create.is_public,
            created_at: Utc::now(),
        };

        self.prompts.write().unwrap().push(prompt.clone());

        self.save_prompts()?;

        Ok(prompt)
    }

    fn update(&self, id: &str, update: PromptUpdate) -> anyhow::Result<Prompt> {
        let mut prompts = self.prompts.write().unwrap();

        let prompt = prompts
            .iter_mut()
            .find(|p| p.id.as_str() == id)
            .ok_or_else(|| anyhow!("prompt with id {id} not found"))?;

        if let Some(title) = update.title {
            prompt.title = title;
        }
        if let Some(description) = update.description {
            prompt.description = description;
        }
        if let Some(content) = update.content {
            prompt.content = content;
        }
        if let Some(category) = update.category {
            prompt.category = category;
        }
        if let Some(tags) = update.tags {
            prompt.tags = tags;
            let mut seen = HashSet::new();
            prompt.tags.retain(|item| seen.insert(item.clone()));
        }
        if let Some(is_public) = update.is_public {
            prompt.is_public = Some(is_public);
        }

        let result = prompt.clone();
        drop(prompts);

        self.save_prompts()?;

        Ok(result)
    }

    fn delete(&self, id: &str) -> anyhow::Result<()> {
        let mut prompts = self.prompts.write().unwrap();
        let found = prompts.iter().position(|p| p.id.as_str() == id).map(|idx| {
            prompts.remove(idx);
        });

        drop(prompts);

        if found.is_some() {
            self.comments
                .write()
                .unwrap()
                .retain(|c| c.prompt_id.as_str() != id);
            self.save()?;
        }

        Ok(())
    }

    fn like(&self, id: &str, user: &str) -> anyhow::Result<Prompt> {
        let mut prompts = self.prompts.write().unwrap();

        let prompt = prompts
            .iter_mut()
            .find(|p| p.id.as_str() == id)
            .ok_or_else(|| anyhow!("prompt with id {id} not found"))?;

        // toggle
        if prompt.likes.iter().any(|u| u == user) {
            prompt.likes.retain(|u| u != user);
        } else {
            prompt.likes.push(user.to_string());
        }

        let result = prompt.clone();
        drop(prompts);

        self.save_prompts()?;

        Ok(result)
    }

    fn add_comment(&self, prompt_id: &str, create: CommentCreate) -> anyhow::Result<Comment> {
        {
            let prompts = self.prompts.read().unwrap();
            if !prompts.iter().any(|p| p.id.as_str() == prompt_id) {
                return Err(anyhow!("prompt with id {prompt_id} not found"));
            }
        }

        let comment = Comment {
            id: Eid::new(),
            prompt_id: Eid::from(prompt_id),
            author: create.author,
            body: create.body,
            created_at: Utc::now(),
        };

        self.comments.write().unwrap().push(comment.clone());

        self.save_comments()?;

        Ok(comment)
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.prompts.read().unwrap().len())
    }

    fn tags(&self) -> anyhow::Result<Vec<String>> {
        let prompts = self.prompts.read().unwrap();
        let mut tags: Vec<String> = prompts
            .iter()
            .flat_map(|p| p.tags.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        tags.sort();
        Ok(tags)
    }
}
