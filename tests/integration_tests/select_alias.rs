// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use rmpv::Value;
use serial_test::serial;
use tarantool_client_rs::{client::requests::DEFAULT_LIMIT, error::Error};

use crate::integration_tests::common::{connect_or_skip, load_config, reset_examples_space};

fn row(id: u32, name: &str, wage: u32) -> Vec<Value> {
    vec![Value::from(id), Value::from(name), Value::from(wage)]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn select_by_iterator_alias_on_a_secondary_index() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };
    reset_examples_space(&conn).await?;
    conn.parse_schema().await?;

    conn.insert("examples", &row(1, "vlad", 75)).await?;
    conn.insert("examples", &row(2, "raj", 10)).await?;
    conn.insert("examples", &row(3, "nina", 22)).await?;

    let rows = conn
        .select(
            "examples",
            "wage",
            ">=",
            &[Value::from(75u32)],
            0,
            DEFAULT_LIMIT,
        )
        .await?;
    assert_eq!(rows, vec![Value::Array(row(1, "vlad", 75))]);

    // The typed form and the alias must agree.
    let all = conn
        .select("examples", "primary", "all", &[], 0, DEFAULT_LIMIT)
        .await?;
    assert_eq!(all.len(), 3);

    match conn
        .select("examples", "wage", "between", &[], 0, DEFAULT_LIMIT)
        .await
    {
        Err(Error::BadArgument(_)) => {},
        other => panic!("unknown alias must be rejected, got {other:?}"),
    }

    conn.close().await;
    Ok(())
}
