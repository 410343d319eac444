//! Compile a table update into every backend and print the artifacts.
//!
//! Usage: cargo run -p stencil-core --example compile_update_item

use serde_json::json;
use stencil_core::{Compiler, Target, read_document};
use std::process;

fn main() {
    let source = json!({
        "function": {
            "params": ["input"],
            "body": [
                { "const": "item", "init": {
                    "call": { "prop": [{ "ref": "table" }, "updateItem"] },
                    "args": [{ "object": [
                        { "name": "key", "value": { "object": [
                            { "name": "id", "value": { "object": [
                                { "name": "S", "value": { "path": "input.id" } }
                            ] } }
                        ] } },
                        { "name": "update", "value": { "object": [
                            { "name": "expression", "value": "#n = #n + :one" },
                            { "name": "expressionNames", "value": { "object": [
                                { "name": "#n", "value": "n" }
                            ] } }
                        ] } }
                    ] }]
                } },
                { "return": { "id": "item" } }
            ]
        },
        "externals": { "table": { "kind": "table", "name": "Counters" } }
    });

    let doc = read_document(&source).unwrap_or_else(|e| {
        eprintln!("read: {e}");
        process::exit(1);
    });
    let compiler = Compiler::for_document(&doc);

    for target in [Target::Vtl, Target::Asl] {
        let artifact = compiler
            .compile(&doc.tree, doc.function(), target)
            .unwrap_or_else(|e| {
                eprintln!("compile {target}: {} ({})", e.message, e.code);
                process::exit(1);
            });
        let text = artifact.render().unwrap_or_else(|e| {
            eprintln!("render {target}: {e}");
            process::exit(1);
        });
        println!("== {target} ==\n{text}\n");
    }

    match compiler.compile(&doc.tree, doc.function(), Target::Events) {
        Ok(_) => println!("== events ==\nunexpected success"),
        Err(e) => println!("== events ==\nrejected: {}", e.message),
    }
}
