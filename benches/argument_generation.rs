use gas_fuzz::ast::parse_source_unit;
use gas_fuzz::env::DetachedReader;
use gas_fuzz::rules::RuleSet;
use gas_fuzz::{ArgumentFuzzer, FuzzConfig};
use std::time::Instant;

const PERF_BUDGET_MS: u128 = 1_500;
const BENCH_ROUNDS: usize = 7;
const VALUES_PER_ROUND: usize = 2_000;

const GUARDED_UNIT: &str = r#"{
    "nodeType": "SourceUnit",
    "nodes": [{
        "nodeType": "ContractDefinition",
        "name": "Pool",
        "nodes": [{
            "nodeType": "FunctionDefinition",
            "name": "swap",
            "parameters": {"parameters": [{"name": "amountIn"}, {"name": "path"}]},
            "body": {"nodeType": "Block", "statements": [
                {"nodeType": "ExpressionStatement", "expression": {
                    "nodeType": "FunctionCall",
                    "expression": {"nodeType": "Identifier", "name": "require"},
                    "arguments": [{
                        "nodeType": "BinaryOperation", "operator": "!=",
                        "leftExpression": {"nodeType": "Identifier", "name": "amountIn"},
                        "rightExpression": {"nodeType": "Literal", "kind": "number", "value": "0"},
                        "src": "40:14:0"
                    }]
                }}
            ]}
        }]
    }]
}"#;

const RULES: &str = r#"{
    "*": {"*": {"uint128": {"rules": [{"rule-type": "limits", "min": 1, "max": 1000000}]}}}
}"#;

const TYPES: [(&str, &str); 4] = [
    ("uint128", "amountIn"),
    ("address[]", "path"),
    ("(uint128,bytes32,string)", "order"),
    ("int24[4]", "ticks"),
];

fn median_ms(mut samples: Vec<u128>) -> u128 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    samples[samples.len() / 2]
}

fn run_single_round(fuzzer: &mut ArgumentFuzzer) -> Result<u128, String> {
    let started = Instant::now();
    let mut reader = DetachedReader;
    for i in 0..VALUES_PER_ROUND {
        let (ty, name) = TYPES[i % TYPES.len()];
        fuzzer
            .fuzz_arg("Pool", "swap", ty, name, &mut reader)
            .map_err(|err| err.to_string())?;
    }
    Ok(started.elapsed().as_millis())
}

fn main() {
    let unit = match parse_source_unit(GUARDED_UNIT) {
        Ok(unit) => unit,
        Err(err) => {
            eprintln!("[BENCH][FAIL] fixture AST did not parse: {err}");
            std::process::exit(1);
        }
    };
    let rules = match RuleSet::from_json_str(RULES) {
        Ok(rules) => rules,
        Err(err) => {
            eprintln!("[BENCH][FAIL] fixture rules rejected: {err}");
            std::process::exit(1);
        }
    };

    let config = FuzzConfig {
        mean_length: 16,
        ..FuzzConfig::default().with_seed(0xbe7c)
    };
    let mut fuzzer = ArgumentFuzzer::new(config).with_rules(rules);
    fuzzer.index_source_unit(&unit);

    let mut rounds = Vec::with_capacity(BENCH_ROUNDS);
    for _ in 0..BENCH_ROUNDS {
        match run_single_round(&mut fuzzer) {
            Ok(elapsed_ms) => rounds.push(elapsed_ms),
            Err(err) => {
                eprintln!("[BENCH][FAIL] generation failed: {err}");
                std::process::exit(1);
            }
        }
    }

    let median = median_ms(rounds.clone());
    println!(
        "[BENCH] argument_generation rounds_ms={:?} median_ms={} budget_ms={} values_per_round={}",
        rounds, median, PERF_BUDGET_MS, VALUES_PER_ROUND
    );

    if median > PERF_BUDGET_MS {
        eprintln!(
            "[BENCH][FAIL] argument generation median {}ms exceeded {}ms budget",
            median, PERF_BUDGET_MS
        );
        std::process::exit(1);
    }

    println!(
        "[BENCH][PASS] argument generation median {}ms within {}ms budget",
        median, PERF_BUDGET_MS
    );
}
