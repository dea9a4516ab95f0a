//! 排队核心演示程序
//!
//! 展示入队受理、优先级排序、等待时长估算与状态转换。

use intake_core::{PatientDetails, Priority, Service};
use intake_queue::{QueueAction, QueueManager};
use uuid::Uuid;

fn details(name: &str) -> PatientDetails {
    PatientDetails {
        name: name.to_string(),
        phone: "13800000000".to_string(),
        email: format!("{}@example.com", name),
        date_of_birth: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🏥 患者排队核心演示\n");

    let service = Service {
        id: Uuid::new_v4(),
        name: "General Medicine".to_string(),
        department: "Internal Medicine".to_string(),
        is_active: true,
        average_service_minutes: 15,
    };

    let mut manager = QueueManager::new();
    let mut events = manager.subscribe();

    // 1. 三位普通优先级患者依次入队
    let a = manager.join(&service, Uuid::new_v4(), Priority::Normal, &details("alice"), None)?;
    let b = manager.join(&service, Uuid::new_v4(), Priority::Normal, &details("bob"), None)?;
    let c = manager.join(&service, Uuid::new_v4(), Priority::Normal, &details("carol"), None)?;

    println!("✅ 三位普通优先级患者入队:");
    for entry in [&a, &b, &c] {
        println!(
            "   号码 {} -> 排名 {}，预计等待 {} 分钟",
            entry.queue_number, entry.position, entry.estimated_wait_minutes
        );
    }

    // 2. 紧急患者插队
    let d = manager.join(&service, Uuid::new_v4(), Priority::Urgent, &details("dave"), None)?;
    println!(
        "\n🚨 紧急患者入队: 号码 {} -> 排名 {}，预计等待 {} 分钟",
        d.queue_number, d.position, d.estimated_wait_minutes
    );

    println!("   既有患者排名被推后:");
    for id in [a.id, b.id, c.id] {
        let refreshed = manager.refreshed_entry(id, service.average_service_minutes)?;
        println!(
            "   号码 {} -> 排名 {}，预计等待 {} 分钟",
            refreshed.queue_number, refreshed.position, refreshed.estimated_wait_minutes
        );
    }

    // 3. 外部叫号与就诊
    manager.observe(d.id, QueueAction::Call)?;
    manager.observe(d.id, QueueAction::StartService)?;
    println!("\n📣 紧急患者已叫号并开始就诊");

    // 就诊中不允许离队
    match manager.leave(d.id) {
        Err(e) => println!("   就诊中尝试离队被拒绝: {}", e),
        Ok(_) => unreachable!(),
    }

    // 4. 普通患者离队
    manager.leave(b.id)?;
    let refreshed_c = manager.refreshed_entry(c.id, service.average_service_minutes)?;
    println!(
        "\n👋 号码 {} 离队后，号码 {} 的排名变为 {}",
        b.queue_number, refreshed_c.queue_number, refreshed_c.position
    );

    // 5. 队列变更事件
    let mut event_count = 0;
    while events.try_recv().is_ok() {
        event_count += 1;
    }
    println!("\n📊 本次演示共产生 {} 个队列变更事件", event_count);

    Ok(())
}
