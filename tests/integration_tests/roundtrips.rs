// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use rmpv::Value;
use serial_test::serial;
use tarantool_client_rs::client::requests::DEFAULT_LIMIT;

use crate::integration_tests::common::{connect_or_skip, load_config, reset_examples_space};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn eval_adds_its_arguments() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };

    let response = conn
        .eval(
            "local a, b = ...; return a + b",
            &[Value::from(1u32), Value::from(2u32)],
        )
        .await?;
    assert_eq!(response.data(), &[Value::from(3u32)]);

    conn.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn insert_then_get_returns_the_tuple_verbatim() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };
    reset_examples_space(&conn).await?;
    conn.parse_schema().await?;

    let tuple = vec![Value::from(7u32), Value::from("lena"), Value::from(44u32)];
    conn.insert("examples", &tuple).await?;

    let got = conn.get("examples", &[Value::from(7u32)]).await?;
    assert_eq!(got, Some(Value::Array(tuple)));

    assert_eq!(conn.get("examples", &[Value::from(8u32)]).await?, None);

    conn.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn update_increments_a_numeric_field() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };
    reset_examples_space(&conn).await?;
    conn.parse_schema().await?;

    conn.insert(
        "examples",
        &[Value::from(1u32), Value::from("vlad"), Value::from(75u32)],
    )
    .await?;
    conn.update(
        "examples",
        "primary",
        &[Value::from(1u32)],
        &[Value::Array(vec![
            Value::from("+"),
            Value::from(2u32),
            Value::from(25u32),
        ])],
    )
    .await?;

    let rows = conn
        .select(
            "examples",
            "primary",
            "eq",
            &[Value::from(1u32)],
            0,
            DEFAULT_LIMIT,
        )
        .await?;
    assert_eq!(
        rows,
        vec![Value::Array(vec![
            Value::from(1u32),
            Value::from("vlad"),
            Value::from(100u32),
        ])]
    );

    conn.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn upsert_inserts_then_updates() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };
    reset_examples_space(&conn).await?;
    conn.parse_schema().await?;

    let tuple = [Value::from(5u32), Value::from("ivan"), Value::from(30u32)];
    let bump = [Value::Array(vec![
        Value::from("+"),
        Value::from(2u32),
        Value::from(1u32),
    ])];

    // First upsert inserts the tuple, the second applies the ops.
    conn.upsert("examples", &tuple, &bump).await?;
    conn.upsert("examples", &tuple, &bump).await?;

    let got = conn.get("examples", &[Value::from(5u32)]).await?;
    assert_eq!(
        got,
        Some(Value::Array(vec![
            Value::from(5u32),
            Value::from("ivan"),
            Value::from(31u32),
        ]))
    );

    conn.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn replace_and_delete() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };
    reset_examples_space(&conn).await?;
    conn.parse_schema().await?;

    conn.insert(
        "examples",
        &[Value::from(9u32), Value::from("olga"), Value::from(50u32)],
    )
    .await?;
    conn.replace(
        "examples",
        &[Value::from(9u32), Value::from("olga"), Value::from(55u32)],
    )
    .await?;

    let got = conn.get("examples", &[Value::from(9u32)]).await?;
    assert_eq!(
        got,
        Some(Value::Array(vec![
            Value::from(9u32),
            Value::from("olga"),
            Value::from(55u32),
        ]))
    );

    conn.delete("examples", "primary", &[Value::from(9u32)]).await?;
    assert_eq!(conn.get("examples", &[Value::from(9u32)]).await?, None);

    conn.close().await;
    Ok(())
}
