use axum::Extension;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;

use crate::controller::Controller;
use crate::controller::ItemChanges;
use crate::controller::NewItem;
use crate::items::Item;
use crate::items::ItemId;
use crate::storage::Storage;

use super::Error;
use super::Form;
use super::PathParameters;
use super::QueryParameters;
use super::Success;
use super::double_option;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: ItemId,
    pub name: String,
    pub dose: Option<String>,
    pub unit: Option<String>,
    pub instructions: Option<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl ItemResponse {
    fn from_item(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            dose: item.dose,
            unit: item.unit,
            instructions: item.instructions,
            notes: item.notes,
            active: item.active,
            created_at: item.created_at,
        }
    }

    fn from_item_multiple(items: Vec<Item>) -> Vec<Self> {
        items.into_iter().map(Self::from_item).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Part of the name to look for
    q: Option<String>,
}

pub async fn list<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    QueryParameters(query): QueryParameters<ListQuery>,
) -> Result<Success<Vec<ItemResponse>>, Error> {
    let items = controller.list_items(query.q.as_deref()).await?;

    Ok(Success::ok(ItemResponse::from_item_multiple(items)))
}

pub async fn single<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters(item_id): PathParameters<ItemId>,
) -> Result<Success<ItemResponse>, Error> {
    let item = controller.get_item(item_id).await?;

    Ok(Success::ok(ItemResponse::from_item(item)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemForm {
    name: String,
    dose: Option<String>,
    unit: Option<String>,
    instructions: Option<String>,
    notes: Option<String>,
}

pub async fn create<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    Form(form): Form<CreateItemForm>,
) -> Result<Success<ItemResponse>, Error> {
    let new_item = NewItem {
        name: &form.name,
        dose: form.dose.as_deref(),
        unit: form.unit.as_deref(),
        instructions: form.instructions.as_deref(),
        notes: form.notes.as_deref(),
    };

    let item = controller.add_item(&new_item).await?;

    Ok(Success::created(ItemResponse::from_item(item)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemForm {
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    dose: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    unit: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    instructions: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    notes: Option<Option<String>>,
    active: Option<bool>,
}

pub async fn update<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters(item_id): PathParameters<ItemId>,
    Form(form): Form<UpdateItemForm>,
) -> Result<Success<ItemResponse>, Error> {
    let changes = ItemChanges {
        name: form.name.as_deref(),
        dose: form.dose.as_ref().map(Option::as_deref),
        unit: form.unit.as_ref().map(Option::as_deref),
        instructions: form.instructions.as_ref().map(Option::as_deref),
        notes: form.notes.as_ref().map(Option::as_deref),
        active: form.active,
    };

    let item = controller.update_item(item_id, &changes).await?;

    Ok(Success::ok(ItemResponse::from_item(item)))
}

pub async fn delete<S: Storage>(
    Extension(controller): Extension<Controller<S>>,
    PathParameters(item_id): PathParameters<ItemId>,
) -> Result<Success<&'static str>, Error> {
    controller.delete_item(item_id).await?;

    Ok(Success::<&'static str>::no_content())
}
