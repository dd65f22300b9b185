use axum::http::StatusCode;
use serde_json::json;

use crate::tests::helper;

#[tokio::test]
async fn test_items() {
    let (mut app, _) = helper::setup_test_app().await;

    // verify empty item list
    let (status_code, items) = helper::list_items(&mut app, None).await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(Some(Vec::<helper::Item>::new()), items);

    // create item, fields are trimmed and blanks dropped
    let (status_code, item, _) = helper::maybe_create_item(
        &mut app,
        "  Ibuprofen ",
        Some(" 500 "),
        Some("mg"),
        Some("   "),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    let item = item.unwrap();
    assert_eq!("Ibuprofen", item.name);
    assert_eq!(Some("500".to_string()), item.dose);
    assert_eq!(Some("mg".to_string()), item.unit);
    assert_eq!(None, item.instructions);
    assert!(item.active);

    // verify item
    let (status_code, single, _) = helper::single_item(&mut app, item.id).await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(Some(item), single);

    // list is ordered by name
    helper::create_item(&mut app, "Paracetamol").await;
    helper::create_item(&mut app, "Amoxicillin").await;

    let (status_code, items) = helper::list_items(&mut app, None).await;
    assert_eq!(StatusCode::OK, status_code);
    let names = items
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect::<Vec<_>>();
    assert_eq!(vec!["Amoxicillin", "Ibuprofen", "Paracetamol"], names);

    // search on part of the name
    let (status_code, items) = helper::list_items(&mut app, Some("CET")).await;
    assert_eq!(StatusCode::OK, status_code);
    let names = items
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect::<Vec<_>>();
    assert_eq!(vec!["Paracetamol"], names);

    // blank search lists everything
    let (status_code, items) = helper::list_items(&mut app, Some("")).await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(3, items.unwrap().len());
}

#[tokio::test]
async fn test_create_item_requires_name() {
    let (mut app, _) = helper::setup_test_app().await;

    let (status_code, item, error) =
        helper::maybe_create_item(&mut app, "   ", Some("500"), None, None).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(None, item);
    assert_eq!(Some("The medication name is required".to_string()), error);

    let (_, items) = helper::list_items(&mut app, None).await;
    assert_eq!(Some(Vec::new()), items);
}

#[tokio::test]
async fn test_update_item() {
    let (mut app, _) = helper::setup_test_app().await;

    let item = helper::create_item(&mut app, "Ibuprofen").await;

    // rename and clear the instructions, leave the dose alone
    let (status_code, updated, _) = helper::maybe_update_item(
        &mut app,
        item.id,
        json!({ "name": "Ibuprofen forte", "instructions": null }),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    let updated = updated.unwrap();
    assert_eq!("Ibuprofen forte", updated.name);
    assert_eq!(Some("500".to_string()), updated.dose);
    assert_eq!(None, updated.instructions);

    // blank name is refused
    let (status_code, _, error) =
        helper::maybe_update_item(&mut app, item.id, json!({ "name": " " })).await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(Some("The medication name is required".to_string()), error);

    let (_, single, _) = helper::single_item(&mut app, item.id).await;
    assert_eq!("Ibuprofen forte", single.unwrap().name);

    // deactivate
    let (status_code, updated, _) =
        helper::maybe_update_item(&mut app, item.id, json!({ "active": false })).await;
    assert_eq!(StatusCode::OK, status_code);
    assert!(!updated.unwrap().active);

    // unknown item
    let (status_code, _, error) =
        helper::maybe_update_item(&mut app, 999, json!({ "active": false })).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!(Some("Medication not found".to_string()), error);
}

#[tokio::test]
async fn test_delete_item() {
    let (mut app, fixture) = helper::setup_test_app().await;

    let item = helper::create_item(&mut app, "Ibuprofen").await;
    let (status_code, reminder, _) =
        helper::maybe_create_reminder(&mut app, item.id, json!({ "minutes": 480 })).await;
    assert_eq!(StatusCode::CREATED, status_code);
    let reminder = reminder.unwrap();
    assert!(fixture.delivery.pending_for(reminder.id).is_some());

    let (status_code, _) = helper::maybe_delete_item(&mut app, item.id).await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    // gone, together with its reminders and their alarms
    let (status_code, _, error) = helper::single_item(&mut app, item.id).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!(Some("Medication not found".to_string()), error);

    let (status_code, _, _) = helper::single_reminder(&mut app, item.id, reminder.id).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert!(fixture.delivery.pending().is_empty());

    // deleting twice
    let (status_code, error) = helper::maybe_delete_item(&mut app, item.id).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!(Some("Medication not found".to_string()), error);
}
