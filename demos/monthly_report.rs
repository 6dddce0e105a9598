use ledger_rollup::{
    analyze_recurring_expenses, format_currency, format_percent, month_name, process_report,
    read_ledger_csv, report_to_csv, summary_to_csv, AdjustmentBook, ColumnMapping,
    InventoryKind, ReportConfig, VendorResolver,
};

const LEDGER: &str = "כותרת,קוד מיון,שם קוד מיון,מפתח חשבון,שם חשבון,חובה / זכות (שקל),פרטים,ת.אסמכ,ת.ערך,ח-ן נגדי,שם חשבון נגדי
101,600,הכנסות ממכירות,40001,מכירות אתר,\"84,500.00\",מכירות ינואר,31/01/2024,,0,
102,600,הכנסות ממכירות,40025,מכירות סופרפארם,\"21,300.00\",סופרפארם ינואר,31/01/2024,,0,
103,800,עלות המכר,60000,קניות סחורה,\"-31,200.00\",חשבונית 4411,08/01/2024,,20035,פלאנט שילוח
104,801,הוצאות שכר,70000,משכורות,\"-18,000.00\",שכר ינואר,09/01/2024,,20122,עומר להט
105,802,הוצאות שיווק,71000,פרסום דיגיטלי,\"-4,250.00\",GOOGLE ADS JAN,12/01/2024,,37999,ספקים לשלם
106,802,הוצאות שיווק,71000,פרסום דיגיטלי,\"-2,180.00\",חיוב פייסבוק,13/01/2024,,37999,ספקים לשלם
107,801,הוצאות שכר,70000,משכורות,\"2,750.00\",ספקים לשלם,14/01/2024,,37999,ספקים לשלם
108,801,הוצאות שכר,70000,משכורות,\"-2,750.30\",היפוך רישום,20/01/2024,,20122,עומר להט
109,813,הוצאות מימון,90000,עמלות בנק,-340.00,עמלות,31/01/2024,,20000,בנק
201,600,הכנסות ממכירות,40001,מכירות אתר,\"79,900.00\",מכירות פברואר,29/02/2024,,0,
202,800,עלות המכר,60000,קניות סחורה,\"-28,600.00\",חשבונית 4460,07/02/2024,,20035,פלאנט שילוח
203,801,הוצאות שכר,70000,משכורות,\"-18,000.00\",שכר פברואר,09/02/2024,,20122,עומר להט
204,802,הוצאות שיווק,71000,פרסום דיגיטלי,\"-3,900.00\",תשלום לגוגל על קמפיין,11/02/2024,,37999,ספקים לשלם
205,802,הוצאות שיווק,71000,פרסום דיגיטלי,-610.00,,12/02/2024,,37999,ספקים לשלם
";

fn main() {
    let rows = read_ledger_csv(LEDGER.as_bytes(), &ColumnMapping::hashavshevet())
        .expect("embedded ledger should parse");

    let config = ReportConfig {
        organization_name: "Modi Demo Ltd".to_string(),
        year: Some(2024),
        ..ReportConfig::default()
    };

    let mut book = AdjustmentBook::new();
    book.set_inventory(2024, 1, InventoryKind::Opening, 15_000.0);
    book.set_inventory(2024, 1, InventoryKind::Closing, 17_500.0);
    book.set_inventory(2024, 2, InventoryKind::Opening, 17_500.0);
    book.set_inventory(2024, 2, InventoryKind::Closing, 16_000.0);
    book.set_adjustment("800", 2024, 2, -1_200.0);

    let processed = process_report(&rows, &config, &book).expect("pipeline should run");

    println!("=== {} ===", config.organization_name);
    println!(
        "Rows: {} read, {} discarded, {} cancelled",
        rows.len(),
        processed.discarded_rows,
        processed.cancelled.len()
    );

    for category in &processed.report.categories {
        let shown = category.display_data();
        if shown.total == 0.0 {
            continue;
        }
        println!("\n{} [{}]: {}", category.name, category.code, format_currency(shown.total));
        for account in category.visible_accounts() {
            println!(
                "  {} {}: {}",
                account.account_key,
                account.account_name,
                format_currency(account.data.display(category.kind).total)
            );
            for vendor in account.visible_vendors() {
                println!(
                    "    {} ({}): {}",
                    vendor.vendor_name,
                    vendor.vendor_key,
                    format_currency(vendor.data.display(category.kind).total)
                );
            }
        }
    }

    println!("\n=== Profit ===");
    for (month, line) in &processed.summary.per_month {
        println!(
            "{:<8} revenue {:>14}  gross {:>14} ({})  net {:>14} ({})",
            month_name(*month).unwrap_or("?"),
            format_currency(line.revenue),
            format_currency(line.gross_profit),
            format_percent(line.gross_profit, line.revenue),
            format_currency(line.net_profit),
            format_percent(line.net_profit, line.revenue),
        );
    }
    let total = &processed.summary.total;
    println!(
        "Total    net {} (before adjustments {})",
        format_currency(total.net_profit),
        format_currency(total.original_net_profit)
    );

    println!("\n=== Supplier alerts ===");
    let resolver = VendorResolver::from_config(&config);
    let vendors = analyze_recurring_expenses(
        &processed.transactions,
        &processed.report.months,
        &resolver,
    );
    for vendor in &vendors {
        for alert in &vendor.alerts {
            println!("{} ({}): {}", vendor.vendor_name, vendor.vendor_key, alert);
        }
    }

    println!("\n=== CSV ===");
    print!(
        "{}",
        report_to_csv(&processed.report, false).expect("report export")
    );
    print!(
        "{}",
        summary_to_csv(&processed.summary, false).expect("summary export")
    );
}
